/// Error kinds the client binary can hit.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
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
