//! Backend that trusts every ticket.

use warden_transport::ConnectionId;

use crate::{
    AuthBackend, AuthCompletion, AuthError, AuthTicket, AuthenticationResult,
    BeginOutcome, VerifiedIdentity,
};

/// Accepts every ticket and verifies the claimed id as is.
///
/// Only for servers that run with authentication turned off, or for
/// local development.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthBackend;

impl AuthBackend for NoAuthBackend {
    fn name(&self) -> &'static str {
        "no-auth"
    }

    fn provider(&self) -> &str {
        "none"
    }

    fn initialize(&mut self) -> Result<(), AuthError> {
        Ok(())
    }

    fn begin_authentication(
        &mut self,
        connection: ConnectionId,
        ticket: AuthTicket,
    ) -> BeginOutcome {
        tracing::debug!(%connection, claimed_id = %ticket.claimed_id, "accepting ticket without validation");
        BeginOutcome::Immediate(AuthenticationResult::verified(
            VerifiedIdentity::new(ticket.claimed_id),
        ))
    }

    fn drain_completions(&mut self) -> Vec<AuthCompletion> {
        Vec::new()
    }

    fn end_session(&mut self, _identity: &str, _connection: ConnectionId) {}

    fn shutdown(&mut self) {}
}
