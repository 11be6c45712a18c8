//! Transport layer: turns typed payloads into framed bytes on a stream
//! socket, and (optionally) splits large messages into size-capped
//! fragments for reassembly on the other end.

pub mod error;
pub mod framed;
pub mod stream;
pub mod transport;

pub use error::NetError;
pub use framed::FramedTransport;
pub use stream::StreamTransport;
pub use transport::Transport;
