use crate::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport has never seen this connection.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The connection was closed.
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}
