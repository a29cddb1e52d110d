//! Ticket validation through an external identity provider.
//!
//! Platform SDKs validate tickets asynchronously and report back through
//! a callback, often on a thread the SDK owns. [`ProviderTicketBackend`]
//! never lets that callback touch its tables: the provider is handed a
//! [`ValidationSink`] and pushes [`ProviderCallback`] records into it; the
//! backend drains the sink on the tick thread in
//! [`drain_completions`](AuthBackend::drain_completions).
//!
//! ```text
//! begin_authentication ──→ pending[claimed_id] ──(callback: approved)──→ active[claimed_id]
//!                                   │                                          │
//!                          (callback: rejected)                    (late callback: rejected)
//!                                   ▼                                          ▼
//!                               removed                                    removed
//! ```

use std::collections::HashMap;

use tokio::sync::mpsc;
use warden_transport::ConnectionId;

use crate::{
    AuthBackend, AuthCompletion, AuthError, AuthTicket, AuthenticationResult,
    BeginOutcome, RejectReason, VerifiedIdentity,
};

/// What the provider concluded about a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// The ticket is genuine and belongs to `verified_id`.
    Approved { verified_id: String },
    /// The ticket was refused.
    Rejected(RejectReason),
}

impl ProviderOutcome {
    /// Maps a numeric SDK outcome code.
    ///
    /// | code | outcome |
    /// |---|---|
    /// | 0 | approved |
    /// | 1 | invalid ticket |
    /// | 2 | expired ticket |
    /// | 3 | ticket already used |
    /// | 4 | banned by provider |
    /// | 5 | identity mismatch |
    /// | 6 | logged in elsewhere |
    /// | other | generic rejection |
    pub fn from_code(code: u32, claimed_id: &str) -> Self {
        match code {
            0 => Self::Approved {
                verified_id: claimed_id.to_string(),
            },
            1 => Self::Rejected(RejectReason::InvalidTicket),
            2 => Self::Rejected(RejectReason::ExpiredTicket),
            3 => Self::Rejected(RejectReason::TicketAlreadyUsed),
            4 => Self::Rejected(RejectReason::Banned),
            5 => Self::Rejected(RejectReason::IdentityMismatch),
            6 => Self::Rejected(RejectReason::LoggedInElsewhere),
            other => Self::Rejected(RejectReason::Other(other)),
        }
    }
}

/// A validation callback, as queued by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCallback {
    /// The claimed identity the validation was started for.
    pub claimed_id: String,
    /// The provider's verdict.
    pub outcome: ProviderOutcome,
}

/// Thread-safe handle a provider uses to report validation results.
#[derive(Debug, Clone)]
pub struct ValidationSink {
    tx: mpsc::UnboundedSender<ProviderCallback>,
}

impl ValidationSink {
    /// Queues a callback. Returns `false` if the backend is gone.
    pub fn deliver(
        &self,
        claimed_id: impl Into<String>,
        outcome: ProviderOutcome,
    ) -> bool {
        self.tx
            .send(ProviderCallback {
                claimed_id: claimed_id.into(),
                outcome,
            })
            .is_ok()
    }

    /// Queues a callback from a raw SDK outcome code.
    pub fn deliver_code(&self, claimed_id: &str, code: u32) -> bool {
        self.deliver(claimed_id, ProviderOutcome::from_code(code, claimed_id))
    }
}

/// Server-side identity provider SDK.
pub trait IdentityProvider: Send + 'static {
    /// Provider tag clients must present.
    fn tag(&self) -> &str;

    /// Starts the SDK. `sink` receives every future validation result.
    fn initialize(&mut self, sink: ValidationSink) -> Result<(), AuthError>;

    /// Whether the SDK can accept validations right now.
    fn is_ready(&self) -> bool;

    /// Starts an asynchronous validation of `credential` for `claimed_id`.
    ///
    /// Errors are immediate refusals; asynchronous verdicts go through the
    /// sink.
    fn begin_validate(
        &mut self,
        credential: &[u8],
        claimed_id: &str,
    ) -> Result<(), AuthError>;

    /// Ends the validation session for `claimed_id`.
    fn cancel(&mut self, claimed_id: &str);

    /// Lets the SDK run its callback dispatch. Called every tick.
    fn run_callbacks(&mut self) {}

    /// Releases SDK resources.
    fn shutdown(&mut self) {}
}

/// Validates tickets through an [`IdentityProvider`].
///
/// At most one validation per claimed identity is outstanding; a second
/// ticket for the same identity is refused with
/// [`AuthError::DuplicatePendingRequest`] and the first is unaffected.
///
/// The provider holds one session per identity. When a newer login for an
/// identity is approved, the connection that held it is told it logged in
/// elsewhere, and only the current holder can end the provider session.
pub struct ProviderTicketBackend<P: IdentityProvider> {
    provider: P,
    pending: HashMap<String, ConnectionId>,
    active: HashMap<String, ConnectionId>,
    sink: ValidationSink,
    callbacks: mpsc::UnboundedReceiver<ProviderCallback>,
    initialized: bool,
}

impl<P: IdentityProvider> ProviderTicketBackend<P> {
    /// Wraps `provider`. Call [`AuthBackend::initialize`] before use.
    pub fn new(provider: P) -> Self {
        let (tx, callbacks) = mpsc::unbounded_channel();
        Self {
            provider,
            pending: HashMap::new(),
            active: HashMap::new(),
            sink: ValidationSink { tx },
            callbacks,
            initialized: false,
        }
    }

    /// Whether a validation for `claimed_id` is outstanding.
    pub fn is_pending(&self, claimed_id: &str) -> bool {
        self.pending.contains_key(claimed_id)
    }

    /// Whether `claimed_id` holds a validated provider session.
    pub fn is_active(&self, claimed_id: &str) -> bool {
        self.active.contains_key(claimed_id)
    }

    /// Number of outstanding validations.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of validated provider sessions.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// The wrapped provider.
    pub fn identity_provider(&self) -> &P {
        &self.provider
    }

    /// The connection holding the provider session for `claimed_id`.
    pub fn active_connection(&self, claimed_id: &str) -> Option<ConnectionId> {
        self.active.get(claimed_id).copied()
    }

    /// Applies one provider callback to the tables.
    fn resolve(
        &mut self,
        callback: ProviderCallback,
        completions: &mut Vec<AuthCompletion>,
    ) {
        let ProviderCallback {
            claimed_id,
            outcome,
        } = callback;

        if let Some(connection) = self.pending.remove(&claimed_id) {
            let result = match outcome {
                ProviderOutcome::Approved { verified_id }
                    if verified_id == claimed_id =>
                {
                    let displaced =
                        self.active.insert(claimed_id.clone(), connection);
                    if let Some(previous) =
                        displaced.filter(|&previous| previous != connection)
                    {
                        tracing::warn!(
                            %previous, %connection, %claimed_id,
                            "identity logged in again, displacing older session"
                        );
                        completions.push(AuthCompletion {
                            connection: previous,
                            result: AuthenticationResult::failed(
                                AuthError::ProviderRejected(
                                    RejectReason::LoggedInElsewhere,
                                ),
                            ),
                        });
                    }
                    tracing::info!(%connection, %claimed_id, "provider approved ticket");
                    AuthenticationResult::verified(VerifiedIdentity::new(
                        verified_id,
                    ))
                }
                ProviderOutcome::Approved { verified_id } => {
                    self.provider.cancel(&claimed_id);
                    tracing::warn!(
                        %connection, %claimed_id, %verified_id,
                        "provider verified a different identity than claimed"
                    );
                    AuthenticationResult::failed(AuthError::ProviderRejected(
                        RejectReason::IdentityMismatch,
                    ))
                }
                ProviderOutcome::Rejected(reason) => {
                    self.provider.cancel(&claimed_id);
                    tracing::warn!(%connection, %claimed_id, %reason, "provider rejected ticket");
                    AuthenticationResult::failed(AuthError::ProviderRejected(
                        reason,
                    ))
                }
            };
            completions.push(AuthCompletion { connection, result });
            return;
        }

        let Some(&connection) = self.active.get(&claimed_id) else {
            tracing::debug!(%claimed_id, "dropping callback for untracked identity");
            return;
        };

        match outcome {
            ProviderOutcome::Approved { .. } => {
                tracing::debug!(%connection, %claimed_id, "ignoring duplicate approval");
            }
            ProviderOutcome::Rejected(reason) => {
                // Late verdict for a session that was already approved,
                // e.g. the account logged in somewhere else.
                self.active.remove(&claimed_id);
                self.provider.cancel(&claimed_id);
                tracing::warn!(%connection, %claimed_id, %reason, "provider revoked active session");
                completions.push(AuthCompletion {
                    connection,
                    result: AuthenticationResult::failed(
                        AuthError::ProviderRejected(reason),
                    ),
                });
            }
        }
    }
}

impl<P: IdentityProvider> AuthBackend for ProviderTicketBackend<P> {
    fn name(&self) -> &'static str {
        "provider-ticket"
    }

    fn provider(&self) -> &str {
        self.provider.tag()
    }

    fn initialize(&mut self) -> Result<(), AuthError> {
        self.provider.initialize(self.sink.clone())?;
        self.initialized = true;
        tracing::info!(provider = %self.provider.tag(), "identity provider initialized");
        Ok(())
    }

    fn begin_authentication(
        &mut self,
        connection: ConnectionId,
        ticket: AuthTicket,
    ) -> BeginOutcome {
        if !self.initialized || !self.provider.is_ready() {
            return BeginOutcome::Immediate(AuthenticationResult::failed(
                AuthError::ProviderUnavailable,
            ));
        }
        if ticket.provider != self.provider.tag() {
            return BeginOutcome::Immediate(AuthenticationResult::failed(
                AuthError::MalformedTicket(format!(
                    "unsupported provider `{}`",
                    ticket.provider
                )),
            ));
        }
        if ticket.credential.is_empty() {
            return BeginOutcome::Immediate(AuthenticationResult::failed(
                AuthError::MalformedTicket("empty credential".into()),
            ));
        }
        if self.pending.contains_key(&ticket.claimed_id) {
            tracing::warn!(
                %connection, claimed_id = %ticket.claimed_id,
                "validation already pending for identity"
            );
            return BeginOutcome::Immediate(AuthenticationResult::failed(
                AuthError::DuplicatePendingRequest(ticket.claimed_id),
            ));
        }

        match self
            .provider
            .begin_validate(&ticket.credential, &ticket.claimed_id)
        {
            Ok(()) => {
                tracing::debug!(%connection, claimed_id = %ticket.claimed_id, "validation started");
                self.pending.insert(ticket.claimed_id, connection);
                BeginOutcome::Pending
            }
            Err(error) => {
                tracing::warn!(%connection, claimed_id = %ticket.claimed_id, %error, "provider refused ticket");
                BeginOutcome::Immediate(AuthenticationResult::failed(error))
            }
        }
    }

    fn tick(&mut self) {
        if self.initialized {
            self.provider.run_callbacks();
        }
    }

    fn drain_completions(&mut self) -> Vec<AuthCompletion> {
        let mut completions = Vec::new();
        while let Ok(callback) = self.callbacks.try_recv() {
            self.resolve(callback, &mut completions);
        }
        completions
    }

    fn end_session(&mut self, identity: &str, connection: ConnectionId) {
        let was_pending = remove_if_held(&mut self.pending, identity, connection);
        let was_active = remove_if_held(&mut self.active, identity, connection);
        if was_pending || was_active {
            // Another connection may still be validating the same identity.
            if self.pending.contains_key(identity) || self.active.contains_key(identity) {
                tracing::debug!(%connection, %identity, "identity still held by another connection");
                return;
            }
            self.provider.cancel(identity);
            tracing::debug!(%connection, %identity, was_pending, was_active, "provider session ended");
        } else {
            tracing::trace!(%connection, %identity, "no provider session held by connection");
        }
    }

    fn shutdown(&mut self) {
        let identities: Vec<String> = self
            .active
            .drain()
            .chain(self.pending.drain())
            .map(|(identity, _)| identity)
            .collect();
        for identity in &identities {
            self.provider.cancel(identity);
        }
        self.provider.shutdown();
        self.initialized = false;
        tracing::info!(ended = identities.len(), "identity provider shut down");
    }
}

/// Removes `identity` from `table` only if `connection` holds it.
fn remove_if_held(
    table: &mut HashMap<String, ConnectionId>,
    identity: &str,
    connection: ConnectionId,
) -> bool {
    if table.get(identity) == Some(&connection) {
        table.remove(identity);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_maps_categories() {
        assert_eq!(
            ProviderOutcome::from_code(0, "9"),
            ProviderOutcome::Approved { verified_id: "9".into() }
        );
        assert_eq!(
            ProviderOutcome::from_code(2, "9"),
            ProviderOutcome::Rejected(RejectReason::ExpiredTicket)
        );
        assert_eq!(
            ProviderOutcome::from_code(6, "9"),
            ProviderOutcome::Rejected(RejectReason::LoggedInElsewhere)
        );
        assert_eq!(
            ProviderOutcome::from_code(77, "9"),
            ProviderOutcome::Rejected(RejectReason::Other(77))
        );
    }

    #[test]
    fn test_sink_deliver_after_backend_dropped_returns_false() {
        struct Idle;
        impl IdentityProvider for Idle {
            fn tag(&self) -> &str {
                "idle"
            }
            fn initialize(&mut self, _sink: ValidationSink) -> Result<(), AuthError> {
                Ok(())
            }
            fn is_ready(&self) -> bool {
                true
            }
            fn begin_validate(&mut self, _: &[u8], _: &str) -> Result<(), AuthError> {
                Ok(())
            }
            fn cancel(&mut self, _: &str) {}
        }

        let backend = ProviderTicketBackend::new(Idle);
        let sink = backend.sink.clone();
        drop(backend);

        assert!(!sink.deliver_code("1", 0));
    }
}
