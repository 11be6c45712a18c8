//! Payload shapes that ride inside a [`crate::PacketHeader`]-framed packet.
//!
//! Hot-path media sub-headers (`AsciiFrameHeader`, `ImageFrameHeader`) are
//! hand-packed little-endian, same as the outer header, since they sit on
//! the per-frame send path at 60 Hz and a serde round-trip there is wasted
//! work. Control-plane messages are rarer and get to use `postcard`.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Sub-header in front of an `ASCII_FRAME` payload: `width(2) | height(2) |
/// color_mode(1) | content_hash(4)`, followed by `width * height` cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsciiFrameHeader {
    pub width: u16,
    pub height: u16,
    pub color_mode: ColorMode,
    /// 32-bit hash of the cell contents, used by receivers to cheaply detect
    /// a frame identical to the last one they rendered.
    pub content_hash: u32,
}

impl AsciiFrameHeader {
    pub const LEN: usize = 9;

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..2].copy_from_slice(&self.width.to_le_bytes());
        buf[2..4].copy_from_slice(&self.height.to_le_bytes());
        buf[4] = self.color_mode as u8;
        buf[5..9].copy_from_slice(&self.content_hash.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Some(bytes) = bytes.get(..Self::LEN) else {
            return Err(ProtocolError::Truncated {
                need: Self::LEN,
                have: bytes.len(),
            });
        };

        Ok(Self {
            width: u16::from_le_bytes(bytes[0..2].try_into().unwrap()),
            height: u16::from_le_bytes(bytes[2..4].try_into().unwrap()),
            color_mode: ColorMode::try_from(bytes[4])?,
            content_hash: u32::from_le_bytes(bytes[5..9].try_into().unwrap()),
        })
    }
}

/// Sub-header in front of an `IMAGE_FRAME` payload (raw captured frame, sent
/// only between a client and its own capture pipeline collaborator — never
/// relayed between clients). `width(4) | height(4)`, followed by
/// `width * height * 3` RGB bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFrameHeader {
    pub width: u32,
    pub height: u32,
}

impl ImageFrameHeader {
    pub const LEN: usize = 8;

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..4].copy_from_slice(&self.width.to_le_bytes());
        buf[4..8].copy_from_slice(&self.height.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Some(bytes) = bytes.get(..Self::LEN) else {
            return Err(ProtocolError::Truncated {
                need: Self::LEN,
                have: bytes.len(),
            });
        };

        Ok(Self {
            width: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            height: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        })
    }
}

/// How an `ASCII_FRAME`'s cells are colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ColorMode {
    /// No color codes, glyph only.
    Mono = 0,
    /// 16-color ANSI.
    Ansi16 = 1,
    /// 256-color ANSI.
    Ansi256 = 2,
    /// 24-bit truecolor ANSI.
    TrueColor = 3,
}

impl TryFrom<u8> for ColorMode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Mono,
            1 => Self::Ansi16,
            2 => Self::Ansi256,
            3 => Self::TrueColor,
            other => return Err(ProtocolError::UnknownType(other as u16)),
        })
    }
}

/// `CLIENT_JOIN` payload sent client→server: the client's ephemeral
/// handshake public key plus its initial display capabilities, so the
/// server can complete the crypto handshake and seed the roster in one
/// round trip rather than a separate `SIZE` message after join.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JoinRequest {
    pub width: u16,
    pub height: u16,
    pub color_mode: ColorMode,
    pub public_key: [u8; 32],
}

/// `CLIENT_JOIN` payload sent server→client in reply: the server's half of
/// the handshake plus the client id it has assigned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JoinAccept {
    pub client_id: u32,
    pub public_key: [u8; 32],
}

/// `SIZE` payload: a client telling the server (and, via roster broadcast,
/// every other client) the terminal dimensions it wants to receive frames
/// rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeMessage {
    pub width: u16,
    pub height: u16,
    pub color_mode: ColorMode,
}

/// `STREAM_START` payload: which of the two media kinds a client is about
/// to begin sending. A client with both `false` has joined but is muted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStartMessage {
    pub audio: bool,
    pub video: bool,
}

/// One row of the roster carried in a `SERVER_STATE` broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub client_id: u32,
    pub width: u16,
    pub height: u16,
    pub color_mode: ColorMode,
    pub audio_active: bool,
    pub video_active: bool,
}

/// `SERVER_STATE` payload: the full membership roster, broadcast whenever it
/// changes (join, leave, size change, stream start/stop) so clients can size
/// their own layout without a separate query protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStateMessage {
    pub roster: Vec<RosterEntry>,
}
