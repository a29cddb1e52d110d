//! Error types for the client handshake.

use warden_protocol::ProtocolError;
use warden_transport::TransportError;

/// Errors surfaced by [`ClientHandshake`](crate::ClientHandshake).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A server message could not be decoded, or ours could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The link refused a message.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The local identity provider could not issue a credential.
    #[error("could not issue credential: {0}")]
    Credential(String),
}
