//! The per-connection state bundle and the
//! lifecycle states it moves through.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use glyphcast_collab::crypto::Crypto;
use glyphcast_collab::renderer::PixelFrame;
use glyphcast_net::Transport;
use glyphcast_proto::types::ColorMode;
use glyphcast_proto::PacketType;
use glyphcast_rt::{DoubleBuffer, Fifo};
use parking_lot::Mutex;

use crate::error::ServerError;

/// ~500ms at 48kHz stereo float32.
/// Sized per consumer ring the mixer hands out for this client's audio,
/// not stored on the record itself (see `mixer::AudioSource`).
pub const AUDIO_RING_CAPACITY_SAMPLES: usize = 48_000 / 2 * 2;
/// This exact capacity is what the drop-oldest test below exercises.
pub const AUDIO_FIFO_CAPACITY_PACKETS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Handshaking,
    Active,
    Draining,
    Terminated,
}

#[derive(Debug, Clone, Copy)]
pub struct DisplayCaps {
    pub width: u16,
    pub height: u16,
    pub color_mode: ColorMode,
}

impl Default for DisplayCaps {
    fn default() -> Self {
        Self {
            width: 80,
            height: 24,
            color_mode: ColorMode::Mono,
        }
    }
}

/// Latest frame a client has sent, overwritten in place with no queueing.
/// The version counter lets a render thread cheaply tell "has this source
/// produced anything new since I last looked" without comparing frame
/// contents.
#[derive(Default)]
pub struct LatestFrameSlot {
    frame: Mutex<Option<Arc<PixelFrame>>>,
    version: AtomicU64,
}

impl LatestFrameSlot {
    pub fn store(&self, frame: PixelFrame) {
        *self.frame.lock() = Some(Arc::new(frame));
        self.version.fetch_add(1, Ordering::Release);
    }

    pub fn load(&self) -> Option<Arc<PixelFrame>> {
        self.frame.lock().clone()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// Rendered video frame held by the outgoing double-buffer.
pub struct OutgoingVideoFrame {
    pub bytes: Vec<u8>,
    pub rendered_at: Instant,
}

/// The server's per-connection state bundle. Mutated by exactly
/// one receive thread for inbound state, one render thread for outbound
/// video, one audio-render thread for outbound audio, and one send thread
/// for the wire — every field here is either append-only under its own
/// synchronization or written by exactly one of those threads.
///
/// `send_transport` and the receive thread's own transport handle are two
/// independent clones of the same underlying socket (see
/// `glyphcast_net::StreamTransport::try_clone`), not one object shared
/// under a lock: a send blocked on a full kernel buffer must never stall
/// behind a receive thread parked in a 10s-timeout `recv`, and vice versa.
/// The receive half is owned outright by the receive thread (passed to it
/// by value), so it never appears on `ClientRecord` at all.
pub struct ClientRecord {
    pub client_id: u32,
    pub send_transport: Mutex<Box<dyn Transport>>,
    pub crypto: Mutex<Box<dyn Crypto>>,

    pub incoming_video: LatestFrameSlot,
    pub outgoing_video: DoubleBuffer<OutgoingVideoFrame>,
    pub outgoing_audio: Fifo<Vec<u8>>,

    pub display: Mutex<DisplayCaps>,
    pub audio_active: AtomicBool,
    pub video_active: AtomicBool,

    pub active: AtomicBool,
    pub shutting_down: AtomicBool,
    pub crypto_ready: AtomicBool,
    pub connection_lost: AtomicBool,

    pub last_video_send: Mutex<Instant>,
    pub frames_sent: AtomicU64,
    pub network_error_streak: AtomicU32,

    /// Last time the receive thread observed any packet from this client.
    /// Read by the keepalive ticker to decide when to probe.
    pub last_recv_instant: Mutex<Instant>,
    /// Unanswered PING probes since the last PONG. Reset to 0 on any
    /// received packet; three consecutive misses escalates to
    /// `connection_lost`.
    pub missed_pings: AtomicU32,
}

impl ClientRecord {
    pub fn new(client_id: u32, send_transport: Box<dyn Transport>, crypto: Box<dyn Crypto>) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            client_id,
            send_transport: Mutex::new(send_transport),
            crypto: Mutex::new(crypto),
            incoming_video: LatestFrameSlot::default(),
            outgoing_video: DoubleBuffer::new(),
            outgoing_audio: Fifo::new(AUDIO_FIFO_CAPACITY_PACKETS),
            display: Mutex::new(DisplayCaps::default()),
            audio_active: AtomicBool::new(false),
            video_active: AtomicBool::new(false),
            active: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            crypto_ready: AtomicBool::new(false),
            connection_lost: AtomicBool::new(false),
            last_video_send: Mutex::new(now),
            frames_sent: AtomicU64::new(0),
            network_error_streak: AtomicU32::new(0),
            last_recv_instant: Mutex::new(now),
            missed_pings: AtomicU32::new(0),
        })
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        if self.shutting_down.load(Ordering::Acquire) {
            LifecycleState::Draining
        } else if self.crypto_ready.load(Ordering::Acquire) && self.active.load(Ordering::Acquire) {
            LifecycleState::Active
        } else {
            LifecycleState::Handshaking
        }
    }

    pub fn begin_draining(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.outgoing_audio.close();
    }

    pub fn note_recv(&self) {
        *self.last_recv_instant.lock() = Instant::now();
        self.missed_pings.store(0, Ordering::Relaxed);
    }

    /// Seals `plaintext` under this client's session key and sends it on the
    /// send half of the transport. Every application-layer packet this
    /// server emits to an established client goes through here rather than
    /// touching `send_transport` directly, so the AEAD session the
    /// handshake negotiated
    /// actually protects the wire, not just the key exchange.
    pub fn send_sealed(&self, packet_type: PacketType, plaintext: &[u8]) -> Result<(), ServerError> {
        let sealed = self.crypto.lock().seal(plaintext)?;
        self.send_transport.lock().send(packet_type, &sealed)?;
        Ok(())
    }

    /// Opens a ciphertext payload this client sent, under the same session.
    pub fn open_received(&self, ciphertext: &[u8]) -> Result<Vec<u8>, ServerError> {
        Ok(self.crypto.lock().open(ciphertext)?)
    }
}
