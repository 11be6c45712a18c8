//! Conferencing client: captures this side's video/audio, completes the
//! handshake with a `glyphcast-server`, and exchanges framed packets over
//! the wire protocol for the lifetime of one connection.
//!
//! Unlike the server, there is no render or mixer pipeline here — a client
//! only ever sends its own capture/audio and consumes whatever the server
//! already composited for it.

pub mod config;
pub mod error;
pub mod session;

pub use config::ClientConfig;
pub use error::ClientError;
pub use session::{announce_leave, announce_stream_start, connect_and_handshake, ClientSession, RunningSession};
