//! Per-client receive thread: one thread per connection,
//! dispatching inbound packets by type into the client's incoming audio
//! mixer source, incoming video slot, ping/pong responder, or control
//! handlers.
//!
//! Owns its transport handle outright — this is the receive half of the
//! duplex split described on [`crate::client::ClientRecord`], never stored
//! on the record itself, so closing it can never race a send thread's use
//! of the other half.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use glyphcast_collab::codec::AudioCodec;
use glyphcast_collab::renderer::PixelFrame;
use glyphcast_net::Transport;
use glyphcast_proto::types::{ImageFrameHeader, SizeMessage, StreamStartMessage};
use glyphcast_proto::PacketType;

use crate::client::ClientRecord;
use crate::mixer::Mixer;

/// Runs until the transport reports disconnected, a protocol error forces
/// closure, or `client.shutting_down` is observed. Always marks
/// `connection_lost` on any transport/protocol error and always ends by
/// unregistering this client as an audio producer, so lingering packets
/// in flight from peers don't get mixed into a client that's already gone.
pub fn recv_thread_run(
    client: Arc<ClientRecord>,
    mut transport: Box<dyn Transport>,
    mixer: Arc<Mixer>,
    mut audio_decoder: Box<dyn AudioCodec>,
) {
    while !client.shutting_down.load(Ordering::Acquire) {
        let (packet_type, sender_id, payload) = match transport.recv() {
            Ok(packet) => packet,
            Err(glyphcast_net::NetError::RecvTimeout) => continue,
            Err(err) => {
                log::debug!("client {}: recv error, closing: {err}", client.client_id);
                client.connection_lost.store(true, Ordering::Release);
                break;
            }
        };

        if sender_id != client.client_id {
            log::warn!(
                "client {}: packet claimed client_id {sender_id}, ignoring",
                client.client_id
            );
            continue;
        }

        client.note_recv();

        let plaintext = match client.open_received(&payload) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                log::warn!("client {}: failed to open sealed payload, closing connection: {err}", client.client_id);
                client.connection_lost.store(true, Ordering::Release);
                break;
            }
        };

        if let Err(err) = dispatch(&client, &mixer, &mut *audio_decoder, packet_type, &plaintext) {
            log::warn!("client {}: {err}, closing connection", client.client_id);
            client.connection_lost.store(true, Ordering::Release);
            break;
        }
    }

    transport.close();
    mixer.unregister_producer(client.client_id);
    log::debug!("receive thread for client {} exiting", client.client_id);
}

fn dispatch(
    client: &Arc<ClientRecord>,
    mixer: &Arc<Mixer>,
    audio_decoder: &mut dyn AudioCodec,
    packet_type: PacketType,
    payload: &[u8],
) -> Result<(), crate::error::ServerError> {
    match packet_type {
        PacketType::Audio => {
            let samples = audio_decoder.decode(payload)?;
            mixer.push(client.client_id, &samples);
        }
        PacketType::ImageFrame => {
            let header = ImageFrameHeader::decode(payload)?;
            let expected = header.width as usize * header.height as usize * 3;
            let rgb = payload.get(ImageFrameHeader::LEN..).unwrap_or(&[]);
            if rgb.len() != expected {
                return Err(glyphcast_proto::ProtocolError::Truncated {
                    need: expected,
                    have: rgb.len(),
                }
                .into());
            }
            client.incoming_video.store(PixelFrame::new(
                header.width,
                header.height,
                rgb.to_vec(),
                now_ns(),
            ));
        }
        PacketType::Size => {
            let message: SizeMessage = postcard::from_bytes(payload).map_err(glyphcast_proto::ProtocolError::from)?;
            let mut caps = client.display.lock();
            caps.width = message.width;
            caps.height = message.height;
            caps.color_mode = message.color_mode;
        }
        PacketType::Ping => {
            client.send_sealed(PacketType::Pong, b"")?;
        }
        PacketType::Pong => {
            // `note_recv` in the caller already reset the missed-probe
            // counter; nothing further to do.
        }
        PacketType::StreamStart => {
            let message: StreamStartMessage =
                postcard::from_bytes(payload).map_err(glyphcast_proto::ProtocolError::from)?;
            if message.audio {
                client.audio_active.store(true, Ordering::Relaxed);
            }
            if message.video {
                client.video_active.store(true, Ordering::Relaxed);
            }
        }
        PacketType::StreamStop => {
            if payload.is_empty() {
                client.audio_active.store(false, Ordering::Relaxed);
                client.video_active.store(false, Ordering::Relaxed);
            } else {
                let message: StreamStartMessage =
                    postcard::from_bytes(payload).map_err(glyphcast_proto::ProtocolError::from)?;
                if message.audio {
                    client.audio_active.store(false, Ordering::Relaxed);
                }
                if message.video {
                    client.video_active.store(false, Ordering::Relaxed);
                }
            }
        }
        PacketType::ClientLeave => {
            client.begin_draining();
        }
        PacketType::ClientJoin | PacketType::AsciiFrame | PacketType::ClearConsole | PacketType::ServerState => {
            log::warn!(
                "client {}: received server-origin/handshake-only type {packet_type:?} post-handshake, ignoring",
                client.client_id
            );
        }
    }
    Ok(())
}

fn now_ns() -> u64 {
    // Capture timestamps are advisory (best-effort A/V alignment, spec
    // §1's non-goal on strict lip-sync); the server stamps receipt time
    // since the wire `IMAGE_FRAME` sub-header doesn't carry the client's
    // original capture time.
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphcast_collab::codec::{AudioCodec, CHANNELS, FRAME_SAMPLES};
    use glyphcast_collab::crypto::X25519ChaChaSession;
    use glyphcast_net::StreamTransport;
    use std::net::{TcpListener, TcpStream};

    struct NullCodec;
    impl AudioCodec for NullCodec {
        fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>, glyphcast_collab::CollabError> {
            Ok(samples.iter().flat_map(|s| s.to_le_bytes()).collect())
        }
        fn decode(&mut self, packet: &[u8]) -> Result<Vec<f32>, glyphcast_collab::CollabError> {
            Ok(packet
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
                .collect())
        }
    }

    fn dummy_client(id: u32) -> (Arc<ClientRecord>, StreamTransport) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client_side = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        let transport = StreamTransport::new(server_side, id).unwrap();
        let peer = StreamTransport::new(client_side, id).unwrap();
        (
            ClientRecord::new(id, Box::new(transport.try_clone().unwrap()), Box::new(X25519ChaChaSession::new())),
            peer,
        )
    }

    #[test]
    fn size_message_updates_display_caps() {
        let (client, _peer) = dummy_client(1);
        let message = SizeMessage {
            width: 120,
            height: 40,
            color_mode: glyphcast_proto::types::ColorMode::Ansi256,
        };
        let payload = postcard::to_allocvec(&message).unwrap();
        dispatch(&client.clone(), &Arc::new(Mixer::new()), &mut NullCodec, PacketType::Size, &payload).unwrap();
        let caps = *client.display.lock();
        assert_eq!(caps.width, 120);
        assert_eq!(caps.height, 40);
    }

    #[test]
    fn audio_packet_feeds_the_mixer() {
        let (client, _peer) = dummy_client(1);
        let mixer = Arc::new(Mixer::new());
        mixer.register_producer(1);
        let ring = mixer.attach_consumer(1, 2, 16).unwrap();

        let samples = vec![0.5f32; CHANNELS * FRAME_SAMPLES];
        let mut codec = NullCodec;
        let packet = codec.encode(&samples).unwrap();

        dispatch(&client.clone(), &mixer, &mut codec, PacketType::Audio, &packet).unwrap();

        assert_eq!(ring.len(), samples.len());
    }

    #[test]
    fn stream_stop_with_empty_payload_clears_both_flags() {
        let (client, _peer) = dummy_client(1);
        client.audio_active.store(true, Ordering::Relaxed);
        client.video_active.store(true, Ordering::Relaxed);

        dispatch(&client.clone(), &Arc::new(Mixer::new()), &mut NullCodec, PacketType::StreamStop, &[]).unwrap();

        assert!(!client.audio_active.load(Ordering::Relaxed));
        assert!(!client.video_active.load(Ordering::Relaxed));
    }

    #[test]
    fn client_leave_begins_draining() {
        let (client, _peer) = dummy_client(1);
        dispatch(&client.clone(), &Arc::new(Mixer::new()), &mut NullCodec, PacketType::ClientLeave, &[]).unwrap();
        assert!(client.shutting_down.load(Ordering::Acquire));
    }
}
