//! Error types for the session layer.

use warden_transport::ConnectionId;

/// Errors that can occur while managing sessions or their configuration.
///
/// Authentication failures are not errors here: they travel as an
/// [`AuthenticationResult`](crate::AuthenticationResult) carrying an
/// [`AuthError`](crate::AuthError), because the client has to be told.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server is full. The connection was refused before a session
    /// was created.
    #[error("server is full ({max} players)")]
    CapacityExceeded { max: usize },

    /// No session exists for the given connection.
    #[error("no session for connection {0}")]
    NotFound(ConnectionId),

    /// The configuration file is not valid TOML or has the wrong shape.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The permission lists could not be serialized.
    #[error("could not serialize configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Reading or writing the configuration file failed.
    #[error("configuration i/o: {0}")]
    Io(#[from] std::io::Error),

    /// [`flush`](crate::PermissionResolver::flush) was called on a resolver
    /// that was not loaded from a file.
    #[error("permissions have no backing file")]
    NoBackingFile,
}
