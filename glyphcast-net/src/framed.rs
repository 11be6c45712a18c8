//! Framed-message transport: each call to `send_message` delivers one
//! discrete message, which this layer may split into fragments bounded by
//! a per-side limit.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use glyphcast_proto::{PacketType, MAX_PACKET_SIZE};

use crate::error::NetError;
use crate::transport::Transport;

/// Client-side per-fragment byte limit.
pub const CLIENT_FRAGMENT_LIMIT: usize = 4 * 1024;
/// Server-side per-fragment byte limit.
pub const SERVER_FRAGMENT_LIMIT: usize = 256 * 1024;

/// Reassembly must complete within this long or the connection is closed.
pub const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on how many completed message ids are remembered per sender, to
/// detect a fragment arriving for an already-finished message (the
/// "final fragment followed by another fragment" protocol violation).
const COMPLETED_HISTORY: usize = 64;

const FRAGMENT_HEADER_LEN: usize = 9;

struct FragmentHeader {
    message_id: u32,
    fragment_index: u32,
    is_final: bool,
}

impl FragmentHeader {
    fn encode(&self) -> [u8; FRAGMENT_HEADER_LEN] {
        let mut buf = [0u8; FRAGMENT_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.message_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.fragment_index.to_le_bytes());
        buf[8] = self.is_final as u8;
        buf
    }

    fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), NetError> {
        if bytes.len() < FRAGMENT_HEADER_LEN {
            return Err(glyphcast_proto::ProtocolError::Fragmentation("fragment shorter than its header").into());
        }
        let (header, rest) = bytes.split_at(FRAGMENT_HEADER_LEN);
        Ok((
            Self {
                message_id: u32::from_le_bytes(header[0..4].try_into().unwrap()),
                fragment_index: u32::from_le_bytes(header[4..8].try_into().unwrap()),
                is_final: header[8] != 0,
            },
            rest,
        ))
    }
}

struct ReassemblyEntry {
    buffer: Vec<u8>,
    next_fragment_index: u32,
    created_at: Instant,
}

/// Wraps any [`Transport`] to deliver whole messages, fragmenting outbound
/// ones and reassembling inbound ones. One instance per connection, same
/// threading contract as the transport it wraps.
pub struct FramedTransport<T: Transport> {
    inner: T,
    fragment_limit: usize,
    next_message_id: u32,
    reassembly: HashMap<(u32, u32), ReassemblyEntry>,
    completed: HashMap<(u32, u32), ()>,
    completed_order: VecDeque<(u32, u32)>,
}

impl<T: Transport> FramedTransport<T> {
    pub fn new(inner: T, fragment_limit: usize) -> Self {
        Self {
            inner,
            fragment_limit,
            next_message_id: 0,
            reassembly: HashMap::new(),
            completed: HashMap::new(),
            completed_order: VecDeque::new(),
        }
    }

    pub fn client_side(inner: T) -> Self {
        Self::new(inner, CLIENT_FRAGMENT_LIMIT)
    }

    pub fn server_side(inner: T) -> Self {
        Self::new(inner, SERVER_FRAGMENT_LIMIT)
    }

    /// Sends `payload` as one logical message, split into fragments no
    /// larger than this side's fragment limit.
    pub fn send_message(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<(), NetError> {
        let message_id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);

        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![&[]]
        } else {
            payload.chunks(self.fragment_limit).collect()
        };
        let last = chunks.len() - 1;

        for (index, chunk) in chunks.into_iter().enumerate() {
            let header = FragmentHeader {
                message_id,
                fragment_index: index as u32,
                is_final: index == last,
            };
            let mut framed = header.encode().to_vec();
            framed.extend_from_slice(chunk);
            self.inner.send(packet_type, &framed)?;
        }

        Ok(())
    }

    /// Blocks until a complete message has been reassembled, discarding
    /// fragments for other in-flight messages from other senders as it
    /// reads them off the inner transport (they accumulate in
    /// `self.reassembly` rather than being dropped).
    pub fn recv_message(&mut self) -> Result<(PacketType, u32, Vec<u8>), NetError> {
        loop {
            let (packet_type, client_id, framed) = self.inner.recv()?;
            let (fragment, chunk) = FragmentHeader::decode(&framed)?;
            let key = (client_id, fragment.message_id);

            if self.completed.contains_key(&key) {
                return Err(glyphcast_proto::ProtocolError::Fragmentation(
                    "fragment received for a message already completed",
                )
                .into());
            }

            let entry = self.reassembly.entry(key).or_insert_with(|| ReassemblyEntry {
                buffer: Vec::new(),
                next_fragment_index: 0,
                created_at: Instant::now(),
            });

            if entry.created_at.elapsed() > REASSEMBLY_TIMEOUT {
                self.reassembly.remove(&key);
                return Err(NetError::ReassemblyTimeout(fragment.message_id));
            }

            if fragment.fragment_index != entry.next_fragment_index {
                self.reassembly.remove(&key);
                return Err(
                    glyphcast_proto::ProtocolError::Fragmentation("fragment arrived out of order").into(),
                );
            }

            if entry.buffer.len() + chunk.len() > MAX_PACKET_SIZE as usize {
                self.reassembly.remove(&key);
                return Err(glyphcast_proto::ProtocolError::LengthExceeded(
                    (entry.buffer.len() + chunk.len()) as u32,
                )
                .into());
            }

            entry.buffer.extend_from_slice(chunk);
            entry.next_fragment_index += 1;

            if fragment.is_final {
                let entry = self.reassembly.remove(&key).unwrap();
                self.mark_completed(key);
                return Ok((packet_type, client_id, entry.buffer));
            }
        }
    }

    fn mark_completed(&mut self, key: (u32, u32)) {
        self.completed.insert(key, ());
        self.completed_order.push_back(key);
        if self.completed_order.len() > COMPLETED_HISTORY {
            if let Some(oldest) = self.completed_order.pop_front() {
                self.completed.remove(&oldest);
            }
        }
    }

    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LoopbackTransport {
        outbox: VecDeque<(PacketType, u32, Vec<u8>)>,
        connected: bool,
        client_id: u32,
    }

    impl LoopbackTransport {
        fn new(client_id: u32) -> Self {
            Self {
                outbox: VecDeque::new(),
                connected: true,
                client_id,
            }
        }
    }

    impl Transport for LoopbackTransport {
        fn send(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<(), NetError> {
            self.outbox.push_back((packet_type, self.client_id, payload.to_vec()));
            Ok(())
        }

        fn recv(&mut self) -> Result<(PacketType, u32, Vec<u8>), NetError> {
            self.outbox.pop_front().ok_or(NetError::RecvTimeout)
        }

        fn close(&mut self) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    #[test]
    fn small_message_round_trips_as_single_fragment() {
        let mut framed = FramedTransport::new(LoopbackTransport::new(1), 4096);
        framed.send_message(PacketType::Audio, b"hello").unwrap();
        let (packet_type, client_id, payload) = framed.recv_message().unwrap();
        assert_eq!(packet_type, PacketType::Audio);
        assert_eq!(client_id, 1);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn large_message_splits_and_reassembles() {
        let mut framed = FramedTransport::new(LoopbackTransport::new(1), 16);
        let payload: Vec<u8> = (0..200u32).map(|n| (n % 256) as u8).collect();
        framed.send_message(PacketType::ImageFrame, &payload).unwrap();
        let (_, _, reassembled) = framed.recv_message().unwrap();
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn fragment_after_completion_is_a_protocol_violation() {
        let mut framed = FramedTransport::new(LoopbackTransport::new(1), 16);
        framed.send_message(PacketType::ImageFrame, b"short").unwrap();
        framed.recv_message().unwrap();

        // Replay a stray fragment claiming the same (client, message) pair.
        let stray_header = FragmentHeader {
            message_id: 0,
            fragment_index: 0,
            is_final: true,
        };
        let mut stray = stray_header.encode().to_vec();
        stray.extend_from_slice(b"x");
        framed.inner.outbox.push_back((PacketType::ImageFrame, 1, stray));

        assert!(framed.recv_message().is_err());
    }

    #[test]
    fn empty_payload_sends_one_empty_fragment() {
        let mut framed = FramedTransport::new(LoopbackTransport::new(1), 16);
        framed.send_message(PacketType::Ping, b"").unwrap();
        let (_, _, payload) = framed.recv_message().unwrap();
        assert!(payload.is_empty());
    }
}
