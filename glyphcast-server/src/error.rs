/// Error kinds a per-client thread can hit. Every variant here
/// is terminal for the connection it occurred on; none of them propagate
/// to other clients.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Net(#[from] glyphcast_net::NetError),

    #[error(transparent)]
    Protocol(#[from] glyphcast_proto::ProtocolError),

    #[error(transparent)]
    Collab(#[from] glyphcast_collab::CollabError),

    #[error("handshake failed: {0}")]
    Handshake(&'static str),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
