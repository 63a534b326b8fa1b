use thiserror::Error;

/// Local/fatal error taxonomy for the client library, mirroring
/// `mtl_broker::error::BrokerError` on the other side of the wire.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to broker")]
    Connect(#[source] std::io::Error),

    #[error("socket io error")]
    Io(#[source] std::io::Error),

    #[error("invalid message")]
    Frame(#[from] mtl_wire::FrameError),

    #[error("service already stopped")]
    Stopped,
}
