/// Errors raised while framing or parsing a packet.
///
/// These map onto the `Protocol` error kind: every variant here terminates
/// the connection it was raised on.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("bad magic in packet header")]
    InvalidMagic,

    #[error("packet type {0} is not registered")]
    UnknownType(u16),

    #[error("payload length {0} exceeds MAX_PACKET_SIZE")]
    LengthExceeded(u32),

    #[error("crc mismatch: header said {expected:#010x}, payload hashed to {computed:#010x}")]
    CrcMismatch { expected: u32, computed: u32 },

    #[error("truncated packet: needed {need} bytes, had {have}")]
    Truncated { need: usize, have: usize },

    #[error("packet type does not permit a zero-length payload")]
    EmptyPayloadNotAllowed,

    #[error("fragment reassembly violation: {0}")]
    Fragmentation(&'static str),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] postcard::Error),
}
