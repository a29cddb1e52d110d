//! The pluggable backend contract.
//!
//! A backend turns an [`AuthTicket`] into an [`AuthenticationResult`],
//! either right away or some ticks later. Exactly one backend is active in
//! a server; the [`AuthOrchestrator`](crate::AuthOrchestrator) owns it and
//! is the only caller.

use warden_protocol::{HandshakeResult, Ticket};
use warden_transport::ConnectionId;

use crate::{AuthError, VerifiedIdentity};

/// One validation attempt's worth of client credentials. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTicket {
    /// Provider tag the credential was issued by.
    pub provider: String,
    /// Identity the client claims.
    pub claimed_id: String,
    /// Opaque provider credential.
    pub credential: Vec<u8>,
    /// Nonce of the handshake this ticket answers.
    pub nonce: String,
}

impl AuthTicket {
    /// Converts a wire ticket, decoding its hex payload.
    ///
    /// # Errors
    /// Returns [`AuthError::MalformedTicket`] when a field is empty or the
    /// payload is not hexadecimal.
    pub fn from_wire(ticket: &Ticket) -> Result<Self, AuthError> {
        ticket
            .validate()
            .map_err(|e| AuthError::MalformedTicket(e.to_string()))?;
        let credential = ticket
            .credential_bytes()
            .map_err(|e| AuthError::MalformedTicket(e.to_string()))?;
        Ok(Self {
            provider: ticket.provider.clone(),
            claimed_id: ticket.claimed_id.clone(),
            credential,
            nonce: ticket.nonce.clone(),
        })
    }
}

/// The outcome of one authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResult {
    /// Whether the session may proceed.
    pub success: bool,
    /// Human-readable message, sent to the client.
    pub message: String,
    /// Set only on success.
    pub verified_identity: Option<VerifiedIdentity>,
    /// The connection must be closed, whatever `success` says.
    pub should_disconnect: bool,
    /// The failure category, `None` on success.
    pub error: Option<AuthError>,
}

impl AuthenticationResult {
    /// Message used when a session is admitted without a ticket.
    pub const NOT_REQUIRED: &'static str = "authentication not required";

    /// A successful validation of `identity`.
    pub fn verified(identity: VerifiedIdentity) -> Self {
        Self {
            success: true,
            message: format!("authenticated as {identity}"),
            verified_identity: Some(identity),
            should_disconnect: false,
            error: None,
        }
    }

    /// Success for a session that never needed a ticket.
    pub fn not_required() -> Self {
        Self {
            success: true,
            message: Self::NOT_REQUIRED.to_string(),
            verified_identity: None,
            should_disconnect: false,
            error: None,
        }
    }

    /// A failure; terminal errors carry the disconnect directive.
    pub fn failed(error: AuthError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            verified_identity: None,
            should_disconnect: error.is_terminal(),
            error: Some(error),
        }
    }

    /// The `result` message sent to the client.
    pub fn to_wire(&self) -> HandshakeResult {
        HandshakeResult {
            success: self.success,
            message: self.message.clone(),
            verified_id: self
                .verified_identity
                .as_ref()
                .map(|id| id.as_str().to_string())
                .unwrap_or_default(),
        }
    }
}

/// What [`AuthBackend::begin_authentication`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Validation started; a completion will be drained on a later tick.
    Pending,
    /// The backend decided on the spot.
    Immediate(AuthenticationResult),
}

/// A resolved validation, drained on the tick thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCompletion {
    /// The connection that submitted the ticket.
    pub connection: ConnectionId,
    /// The outcome.
    pub result: AuthenticationResult,
}

/// A ticket validation strategy.
///
/// All methods are called from the tick thread. Implementations whose
/// provider works on other threads must hand results back through a
/// thread-safe queue and surface them in
/// [`drain_completions`](Self::drain_completions).
pub trait AuthBackend: Send + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Provider tag advertised in the `challenge` message.
    fn provider(&self) -> &str;

    /// Prepares the backend. Called once before the first ticket.
    fn initialize(&mut self) -> Result<(), AuthError>;

    /// Starts validating `ticket` for `connection`.
    fn begin_authentication(
        &mut self,
        connection: ConnectionId,
        ticket: AuthTicket,
    ) -> BeginOutcome;

    /// Pumps provider-side work. Default: nothing to pump.
    fn tick(&mut self) {}

    /// Returns the validations that resolved since the last call.
    fn drain_completions(&mut self) -> Vec<AuthCompletion>;

    /// Ends the provider session `connection` holds for `identity`. A
    /// no-op when none is active or another connection holds it.
    fn end_session(&mut self, identity: &str, connection: ConnectionId);

    /// Ends every provider session and releases provider resources.
    fn shutdown(&mut self);
}
