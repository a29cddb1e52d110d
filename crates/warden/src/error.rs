//! Unified error type for Warden.

use warden_client::ClientError;
use warden_protocol::ProtocolError;
use warden_session::{AuthError, SessionError};
use warden_transport::TransportError;

/// Top-level error wrapping every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Connection lookup or send failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode, decode or invalid handshake message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Capacity, configuration or permission persistence.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Backend initialization or authentication failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Client handshake failure.
    #[error(transparent)]
    Client(#[from] ClientError),
}
