//! Session types: the server's record of one connection.
//!
//! A session tracks:
//! - WHICH connection it belongs to and WHEN it appeared
//! - WHO the client claims to be, and who a backend verified it to be
//! - HOW FAR authentication has progressed

use std::cell::OnceCell;
use std::time::Duration;

use tokio::time::Instant;
use warden_transport::ConnectionId;

use crate::{AuthTicket, ClaimedIdentity, IdentityStatus, VerifiedIdentity};

// ---------------------------------------------------------------------------
// AuthState
// ---------------------------------------------------------------------------

/// How far a session's authentication has progressed.
///
/// Transitions only move forward:
///
/// ```text
/// Unauthenticated ──→ Pending ──→ Authenticated
///        │               │              │
///        └───────────────┴──────────────┴──→ Rejected
/// ```
///
/// `Pending` may be re-entered from `Pending` (a retry after a
/// non-terminal failure), but nothing ever returns to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No ticket has been dispatched yet.
    Unauthenticated,
    /// A backend validation has been started.
    Pending,
    /// The session may play.
    Authenticated,
    /// Authentication failed terminally; the connection is being closed.
    Rejected,
}

impl AuthState {
    fn rank(self) -> u8 {
        match self {
            Self::Unauthenticated => 0,
            Self::Pending => 1,
            Self::Authenticated => 2,
            Self::Rejected => 3,
        }
    }

    /// Whether moving to `next` keeps the state monotonic.
    pub fn can_advance_to(self, next: AuthState) -> bool {
        next.rank() >= self.rank()
    }

    /// `Unauthenticated` or `Pending`.
    pub fn is_awaiting(self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Pending)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Server-side record spanning one connection's lifetime.
///
/// Created by the [`SessionRegistry`](crate::SessionRegistry) on whichever
/// arrives first: the connection-opened event or a message for a
/// connection it doesn't track yet. Removed when the connection closes.
#[derive(Debug, Clone)]
pub struct Session {
    connection: ConnectionId,
    connected_at: Instant,
    claimed: Option<ClaimedIdentity>,
    verified: OnceCell<VerifiedIdentity>,
    auth_state: AuthState,
    loopback: bool,
    pub(crate) bypassed: bool,
    pub(crate) join_completed: bool,
    pub(crate) tearing_down: bool,
    /// When the registry asked the transport to close the connection.
    pub(crate) close_requested_at: Option<Instant>,

    // Handshake bookkeeping, owned by the registry.
    pub(crate) nonce: Option<String>,
    pub(crate) client_version: Option<String>,
    pub(crate) ticket: Option<AuthTicket>,
    pub(crate) in_flight: bool,
    pub(crate) retry_at: Option<Instant>,
    /// Claimed id the backend holds a provider session for, if any.
    pub(crate) backend_identity: Option<String>,
}

impl Session {
    pub(crate) fn new(
        connection: ConnectionId,
        connected_at: Instant,
        loopback: bool,
    ) -> Self {
        Self {
            connection,
            connected_at,
            claimed: None,
            verified: OnceCell::new(),
            auth_state: AuthState::Unauthenticated,
            loopback,
            bypassed: false,
            join_completed: false,
            tearing_down: false,
            close_requested_at: None,
            nonce: None,
            client_version: None,
            ticket: None,
            in_flight: false,
            retry_at: None,
            backend_identity: None,
        }
    }

    /// The transport connection this session belongs to.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// When the session was created.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// What the client says about itself. Never use for privileges.
    pub fn claimed(&self) -> Option<&ClaimedIdentity> {
        self.claimed.as_ref()
    }

    /// The backend-verified identity, once set.
    pub fn verified(&self) -> Option<&VerifiedIdentity> {
        self.verified.get()
    }

    /// Unknown, claimed or verified.
    pub fn identity_status(&self) -> IdentityStatus {
        if self.verified.get().is_some() {
            IdentityStatus::Verified
        } else if self.claimed.is_some() {
            IdentityStatus::Claimed
        } else {
            IdentityStatus::Unknown
        }
    }

    /// Current authentication state.
    pub fn auth_state(&self) -> AuthState {
        self.auth_state
    }

    /// Whether the session is the server's own embedded client.
    pub fn is_loopback(&self) -> bool {
        self.loopback
    }

    /// Whether the session was admitted without authentication.
    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Whether the join finalization has run.
    pub fn join_completed(&self) -> bool {
        self.join_completed
    }

    /// Whether the server already started closing this connection.
    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down
    }

    /// The version string the client sent in `hello`.
    pub fn client_version(&self) -> Option<&str> {
        self.client_version.as_deref()
    }

    /// Records a claim. Returns `true` if it differs from the previous one.
    pub(crate) fn claim(&mut self, claimed: ClaimedIdentity) -> bool {
        if self.claimed.as_ref() == Some(&claimed) {
            return false;
        }
        self.claimed = Some(claimed);
        true
    }

    /// Sets the verified identity. Returns `false` if one was already set;
    /// the original is kept.
    pub(crate) fn verify(&mut self, identity: VerifiedIdentity) -> bool {
        self.verified.set(identity).is_ok()
    }

    /// Moves to `next` if that keeps the state monotonic.
    pub(crate) fn advance(&mut self, next: AuthState) -> bool {
        if !self.auth_state.can_advance_to(next) {
            tracing::warn!(
                conn = %self.connection,
                from = ?self.auth_state,
                to = ?next,
                "refusing backwards auth state transition"
            );
            return false;
        }
        self.auth_state = next;
        true
    }

    /// Whether the session is still waiting on authentication and can be
    /// acted on (not bypassed, not already being closed).
    pub(crate) fn is_awaiting_auth(&self) -> bool {
        !self.bypassed && !self.tearing_down && self.auth_state.is_awaiting()
    }

    /// Whether the handshake window has elapsed at `now`.
    pub(crate) fn handshake_expired(
        &self,
        now: Instant,
        timeout: Duration,
    ) -> bool {
        self.is_awaiting_auth()
            && now.saturating_duration_since(self.connected_at) >= timeout
    }
}
