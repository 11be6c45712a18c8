/// Errors raised by the external-collaborator adapters.
///
/// These stay out of `glyphcast-proto::ProtocolError` deliberately: a codec
/// or crypto failure is a different error *kind* (§7 distinguishes
/// `Crypto` and `Resource` from `Protocol`) even though both eventually
/// terminate the connection they occurred on.
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("audio codec error: {0}")]
    Codec(String),

    #[error("crypto handshake failed: {0}")]
    Handshake(&'static str),

    #[error("AEAD open failed (tampered or wrong key)")]
    AeadOpen,

    #[error("allocation failed rendering an output frame, frame dropped")]
    RenderAllocation,
}
