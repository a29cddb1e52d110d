//! # Warden
//!
//! Authentication handshake and session lifecycle for multiplayer servers.
//!
//! Warden decides who gets into a server. A connection becomes a session,
//! the session proves who it is through a pluggable authentication
//! backend, and only a *verified* identity is ever used for permissions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use warden::prelude::*;
//!
//! # async fn serve() -> Result<(), WardenError> {
//! warden::init_tracing();
//! let transport = MemoryTransport::new();
//! let mut host = SessionHost::from_config("warden.toml", NoAuthBackend, transport)?;
//! host.run(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await;
//! # Ok(())
//! # }
//! ```

mod error;
mod host;

pub use error::WardenError;
pub use host::SessionHost;

pub use warden_client as client;
pub use warden_protocol as protocol;
pub use warden_session as session;
pub use warden_tick as tick;
pub use warden_transport as transport;

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Returns `false` if a global subscriber was already set.
pub fn init_tracing() -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

pub mod prelude {
    pub use crate::{SessionHost, WardenError};
    pub use warden_client::{
        ClientEvent, ClientHandshake, ClientState, CredentialIssuer,
    };
    pub use warden_protocol::{Codec, HandshakeMessage, JsonCodec};
    pub use warden_session::{
        AuthBackend, AuthError, AuthOrchestrator, AuthState, IdentityProvider,
        NoAuthBackend, PermissionLevel, ProviderTicketBackend,
        RemoteValidationStub, ServerContext, ServerSettings, SessionEvent,
        SessionRegistry,
    };
    pub use warden_tick::TickConfig;
    pub use warden_transport::{
        ConnectionId, Link, Locality, MemoryTransport, Transport,
    };
}
