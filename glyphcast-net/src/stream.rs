//! Direct stream transport: a contiguous byte stream framed only by each
//! packet's own header.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use glyphcast_proto::{PacketHeader, PacketType, HEADER_LEN};

use crate::error::NetError;
use crate::transport::Transport;

/// Default socket-level send/recv timeout.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

/// `Transport` over a raw `TcpStream`. One instance per connection; not
/// internally synchronized for concurrent sends (the send scheduler serializes
/// via its own mutex).
pub struct StreamTransport {
    stream: TcpStream,
    client_id: u32,
    next_sequence: AtomicU32,
    connected: bool,
}

impl StreamTransport {
    pub fn new(stream: TcpStream, client_id: u32) -> std::io::Result<Self> {
        stream.set_read_timeout(Some(DEFAULT_SOCKET_TIMEOUT))?;
        stream.set_write_timeout(Some(DEFAULT_SOCKET_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            client_id,
            next_sequence: AtomicU32::new(0),
            connected: true,
        })
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Updates the client id this transport tags its own outgoing headers
    /// with. Used by the client binary, which connects before it has been
    /// assigned an id (the handshake's `CLIENT_JOIN`/`JoinRequest` carries
    /// no meaningful originator id of its own) and only learns it from the
    /// server's `JoinAccept` reply.
    pub fn set_client_id(&mut self, client_id: u32) {
        self.client_id = client_id;
    }

    /// Duplicates the underlying socket so send and receive can proceed on
    /// independent threads without contending on one mutex for the whole
    /// `recv` timeout window. The two halves share one kernel socket (reads
    /// and writes on a TCP stream are independent directions) but track
    /// their own sequence counter and connected flag; a send thread never
    /// needs to wait out a quiet connection's blocking `recv` to get a
    /// packet out, and vice versa.
    pub fn try_clone(&self) -> std::io::Result<Self> {
        Ok(Self {
            stream: self.stream.try_clone()?,
            client_id: self.client_id,
            next_sequence: AtomicU32::new(self.next_sequence.load(Ordering::Relaxed)),
            connected: self.connected,
        })
    }

    fn next_sequence(&self) -> u32 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }
}

impl Transport for StreamTransport {
    fn send(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<(), NetError> {
        if !self.connected {
            return Err(NetError::NotConnected);
        }
        let header = PacketHeader::for_send(packet_type, self.client_id, self.next_sequence(), payload)?;
        let result = (|| -> std::io::Result<()> {
            self.stream.write_all(&header.encode())?;
            self.stream.write_all(payload)?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.connected = false;
                Err(NetError::Io(err))
            }
        }
    }

    fn recv(&mut self) -> Result<(PacketType, u32, Vec<u8>), NetError> {
        if !self.connected {
            return Err(NetError::NotConnected);
        }

        let mut header_bytes = [0u8; HEADER_LEN];
        if let Err(err) = self.stream.read_exact(&mut header_bytes) {
            let is_timeout = matches!(err.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock);
            if !is_timeout {
                self.connected = false;
                return Err(NetError::Io(err));
            }
            return Err(NetError::RecvTimeout);
        }

        let header = match PacketHeader::decode(&header_bytes) {
            Ok(header) => header,
            Err(err) => {
                self.connected = false;
                return Err(err.into());
            }
        };

        let mut payload = vec![0u8; header.length as usize];
        if let Err(err) = self.stream.read_exact(&mut payload) {
            self.connected = false;
            return Err(NetError::Io(err));
        }

        if let Err(err) = header.validate_payload(&payload) {
            self.connected = false;
            return Err(err.into());
        }

        Ok((header.packet_type, header.client_id, payload))
    }

    fn close(&mut self) {
        self.connected = false;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn connected_pair() -> (StreamTransport, StreamTransport) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (
            StreamTransport::new(server, 0).unwrap(),
            StreamTransport::new(client, 1).unwrap(),
        )
    }

    #[test]
    fn sends_and_receives_a_packet() {
        let (mut server, mut client) = connected_pair();
        client.send(PacketType::Ping, b"").unwrap();
        let (packet_type, client_id, payload) = server.recv().unwrap();
        assert_eq!(packet_type, PacketType::Ping);
        assert_eq!(client_id, 1);
        assert!(payload.is_empty());
    }

    #[test]
    fn sequence_numbers_strictly_increase() {
        let (mut server, mut client) = connected_pair();
        client.send(PacketType::Ping, b"").unwrap();
        client.send(PacketType::Ping, b"").unwrap();
        let _ = server.recv().unwrap();
        let _ = server.recv().unwrap();
        assert_eq!(client.next_sequence.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn close_marks_transport_disconnected() {
        let (mut server, _client) = connected_pair();
        server.close();
        assert!(!server.is_connected());
    }

    #[test]
    fn cloned_halves_operate_independently() {
        let (mut server, mut client) = connected_pair();
        let mut server_recv_half = server.try_clone().unwrap();

        client.send(PacketType::Ping, b"").unwrap();
        let (packet_type, _, _) = server_recv_half.recv().unwrap();
        assert_eq!(packet_type, PacketType::Ping);

        // The send half is untouched by traffic observed on the clone.
        server.send(PacketType::Pong, b"").unwrap();
        let (packet_type, _, _) = client.recv().unwrap();
        assert_eq!(packet_type, PacketType::Pong);
    }
}
