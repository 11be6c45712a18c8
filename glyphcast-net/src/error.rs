/// Transport-level errors.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] glyphcast_proto::ProtocolError),

    #[error("peer is not connected")]
    NotConnected,

    #[error("recv timed out")]
    RecvTimeout,

    #[error("fragment reassembly timed out for message {0}")]
    ReassemblyTimeout(u32),
}
