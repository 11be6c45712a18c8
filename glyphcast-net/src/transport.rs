use glyphcast_proto::PacketType;

use crate::error::NetError;

/// Shared contract for both transport variants: turn a typed
/// payload into on-wire bytes and back. `send`/`recv` own framing; callers
/// serialize concurrent sends themselves via a per-connection mutex — the
/// transport is not required to be internally thread-safe for sends.
pub trait Transport: Send {
    /// Sends `payload` tagged with `packet_type`. The header's `sequence`
    /// and `crc32` fields are filled in by the transport.
    fn send(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<(), NetError>;

    /// Blocks for the next complete, validated packet.
    fn recv(&mut self) -> Result<(PacketType, u32, Vec<u8>), NetError>;

    fn close(&mut self);

    fn is_connected(&self) -> bool;
}
