//! Authentication: the backend contract, its three variants, and the
//! orchestrator that mediates between sessions and the active backend.
//!
//! ```text
//! SessionRegistry ──begin_authentication──→ AuthOrchestrator ──→ AuthBackend
//!        ▲                                        │
//!        └──────────── tick() → completions ◀─────┘
//! ```

mod backend;
mod error;
mod no_auth;
mod provider;
mod stub;

pub use backend::{
    AuthBackend, AuthCompletion, AuthTicket, AuthenticationResult,
    BeginOutcome,
};
pub use error::{AuthError, RejectReason};
pub use no_auth::NoAuthBackend;
pub use provider::{
    IdentityProvider, ProviderCallback, ProviderOutcome,
    ProviderTicketBackend, ValidationSink,
};
pub use stub::RemoteValidationStub;

use warden_transport::ConnectionId;

use crate::ServerContext;

/// Owns the active [`AuthBackend`] and decides who needs it.
pub struct AuthOrchestrator {
    backend: Box<dyn AuthBackend>,
    require_authentication: bool,
    loopback_bypass: bool,
    ready: bool,
    shut_down: bool,
    init_attempts: u32,
}

impl AuthOrchestrator {
    /// Creates an orchestrator for `backend` using the context's settings.
    pub fn new(backend: impl AuthBackend, ctx: &ServerContext) -> Self {
        Self::boxed(Box::new(backend), ctx)
    }

    /// Like [`new`](Self::new) for a backend chosen at runtime.
    pub fn boxed(backend: Box<dyn AuthBackend>, ctx: &ServerContext) -> Self {
        let settings = ctx.settings();
        Self {
            backend,
            require_authentication: settings.require_authentication,
            loopback_bypass: settings.loopback_bypass,
            ready: false,
            shut_down: false,
            init_attempts: 0,
        }
    }

    /// Initializes the backend. Until this succeeds every ticket is
    /// answered with [`AuthError::ProviderUnavailable`]; [`tick`](Self::tick)
    /// keeps retrying.
    ///
    /// # Errors
    /// Whatever the backend reports, or [`AuthError::ProviderUnavailable`]
    /// after [`shutdown`](Self::shutdown).
    pub fn initialize(&mut self) -> Result<(), AuthError> {
        if self.shut_down {
            return Err(AuthError::ProviderUnavailable);
        }
        if self.ready {
            return Ok(());
        }
        self.init_attempts += 1;
        self.backend.initialize()?;
        self.ready = true;
        tracing::info!(backend = self.backend.name(), provider = %self.backend.provider(), "auth backend ready");
        Ok(())
    }

    /// Whether the backend has initialized.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether [`shutdown`](Self::shutdown) ran. A shut-down orchestrator
    /// never touches its backend again.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// `false` when authentication is globally off or the session is the
    /// server's own loopback client (and loopback bypass is enabled).
    pub fn requires_authentication(&self, loopback: bool) -> bool {
        if !self.require_authentication {
            return false;
        }
        !(loopback && self.loopback_bypass)
    }

    /// Provider tag for `challenge` messages.
    pub fn provider(&self) -> &str {
        self.backend.provider()
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Hands `ticket` to the backend.
    pub fn begin_authentication(
        &mut self,
        connection: ConnectionId,
        ticket: AuthTicket,
    ) -> BeginOutcome {
        if !self.ready || self.shut_down {
            return BeginOutcome::Immediate(AuthenticationResult::failed(
                AuthError::ProviderUnavailable,
            ));
        }
        self.backend.begin_authentication(connection, ticket)
    }

    /// Pumps the backend and returns the completions to apply, in order.
    pub fn tick(&mut self) -> Vec<AuthCompletion> {
        if self.shut_down {
            return Vec::new();
        }
        if !self.ready {
            if let Err(error) = self.initialize() {
                if self.init_attempts == 1 {
                    tracing::warn!(%error, "auth backend not ready, retrying every tick");
                }
                return Vec::new();
            }
        }
        self.backend.tick();
        self.backend.drain_completions()
    }

    /// Cancels the backend session `connection` holds for `identity`.
    pub fn end_session(&mut self, identity: &str, connection: ConnectionId) {
        self.backend.end_session(identity, connection);
    }

    /// Shuts the backend down for good. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.ready {
            self.backend.shutdown();
            self.ready = false;
        }
        self.shut_down = true;
    }
}
