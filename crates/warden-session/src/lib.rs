//! Session lifecycle and authentication for Warden.
//!
//! This crate decides who gets into a server and what they may do:
//!
//! 1. **Sessions**: one record per live connection ([`Session`]),
//!    tracked by the [`SessionRegistry`]
//! 2. **Authentication**: the [`AuthOrchestrator`] dispatches client
//!    tickets to one pluggable [`AuthBackend`]
//! 3. **Permissions**: the [`PermissionResolver`] maps *verified*
//!    identities to a [`PermissionLevel`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Game layer (above)  ← consumes SessionEvents, gates commands on levels
//!     ↕
//! Session Layer (this crate)  ← handshake, identity, permissions
//!     ↕
//! Protocol + Transport (below)  ← handshake messages, connections
//! ```

mod auth;
mod context;
mod error;
mod events;
mod identity;
mod permissions;
mod registry;
mod session;

pub use auth::{
    AuthBackend, AuthCompletion, AuthError, AuthOrchestrator, AuthTicket,
    AuthenticationResult, BeginOutcome, IdentityProvider, NoAuthBackend,
    ProviderCallback, ProviderOutcome, ProviderTicketBackend, RejectReason,
    RemoteValidationStub, ValidationSink,
};
pub use context::{ServerContext, ServerSettings};
pub use error::SessionError;
pub use events::{SessionEvent, Subscription, SubscriptionId};
pub use identity::{ClaimedIdentity, IdentityStatus, VerifiedIdentity};
pub use permissions::{PermissionLevel, PermissionRecord, PermissionResolver};
pub use registry::{CLOSE_GRACE, RETRY_DELAY, SessionRegistry};
pub use session::{AuthState, Session};
