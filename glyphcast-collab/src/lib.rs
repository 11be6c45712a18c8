//! Trait boundaries for everything the conferencing core treats as an
//! external collaborator: the ASCII renderer kernel, media capture, the
//! Opus audio codec, the crypto primitives, raw audio I/O, and the
//! terminal display. The core depends only on these traits; concrete
//! adapters here exist to make the core runnable and testable end to end.

pub mod audio_io;
pub mod capture;
pub mod codec;
pub mod crypto;
pub mod display;
pub mod error;
pub mod renderer;

pub use audio_io::{AudioInput, AudioOutput, DiscardAudioOutput, SilentAudioInput, ToneAudioInput};
pub use capture::{MediaCapture, NullCapture, ScriptedCapture};
pub use codec::{AudioCodec, OpusCodec};
pub use crypto::{Crypto, X25519ChaChaSession};
pub use display::{RecordingDisplay, StdoutDisplay, TerminalDisplay};
pub use error::CollabError;
pub use renderer::{AsciiRenderer, FrameSource, PixelFrame, RenderedFrame, ScalarAsciiRenderer};
