//! Placeholder for validation against a remote HTTP service.

use warden_transport::ConnectionId;

use crate::{
    AuthBackend, AuthCompletion, AuthError, AuthTicket, AuthenticationResult,
    BeginOutcome,
};

/// A backend slot for remote ticket validation that refuses every ticket.
///
/// Selecting it keeps the server running but lets nobody in until a real
/// remote validator replaces it.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteValidationStub;

impl AuthBackend for RemoteValidationStub {
    fn name(&self) -> &'static str {
        "remote-stub"
    }

    fn provider(&self) -> &str {
        "remote"
    }

    fn initialize(&mut self) -> Result<(), AuthError> {
        tracing::warn!("remote validation backend is not implemented; all tickets will be refused");
        Ok(())
    }

    fn begin_authentication(
        &mut self,
        _connection: ConnectionId,
        _ticket: AuthTicket,
    ) -> BeginOutcome {
        BeginOutcome::Immediate(AuthenticationResult::failed(
            AuthError::NotImplemented("remote validation".into()),
        ))
    }

    fn drain_completions(&mut self) -> Vec<AuthCompletion> {
        Vec::new()
    }

    fn end_session(&mut self, _identity: &str, _connection: ConnectionId) {}

    fn shutdown(&mut self) {}
}
