//! The client handshake state machine.

use std::time::Duration;

use tokio::time::Instant;
use warden_protocol::{
    Challenge, Codec, HandshakeMessage, HandshakeResult, Hello, JsonCodec,
    PROTOCOL_VERSION, Ticket,
};
use warden_transport::Link;

use crate::ClientError;

/// How long to wait before re-sending a `hello` whose send failed.
pub const HELLO_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Client-side identity provider.
///
/// Credentials are single-use: the handshake cancels the previous one
/// before asking for the next.
pub trait CredentialIssuer {
    /// Whether this issuer can answer a challenge for `provider`.
    fn supports(&self, provider: &str) -> bool;

    /// Issues a fresh credential. Returns the claimed id and the raw
    /// credential bytes.
    ///
    /// # Errors
    /// Returns [`ClientError::Credential`] if the provider refuses.
    fn issue_credential(&mut self) -> Result<(String, Vec<u8>), ClientError>;

    /// Cancels the credential issued last.
    fn cancel_credential(&mut self);
}

/// Where the handshake stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Waiting for the link to become ready.
    Idle,
    /// `hello` sent, waiting for the challenge.
    HelloSent,
    /// Challenge accepted, credential being issued.
    ChallengeReceived,
    /// `ticket` sent, waiting for the result.
    TicketSent,
    /// The server admitted us.
    Authenticated,
    /// The server refused us. No automatic retry.
    Failed,
}

impl ClientState {
    /// `Authenticated` or `Failed`.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Authenticated | Self::Failed)
    }
}

/// What the caller should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Request the post-authentication bootstrap. `verified_id` is `None`
    /// when the server admitted us without a ticket.
    Authenticated { verified_id: Option<String> },
    /// The server refused us and will close the connection.
    Rejected { message: String },
}

/// Drives one connection's handshake.
///
/// Call [`update`](Self::update) every frame, feed every server message to
/// [`handle_message`](Self::handle_message) and call
/// [`on_disconnect`](Self::on_disconnect) when the link drops.
pub struct ClientHandshake<I: CredentialIssuer, C: Codec = JsonCodec> {
    issuer: I,
    codec: C,
    client_version: String,
    state: ClientState,
    retry_at: Option<Instant>,
    credential_outstanding: bool,
    verified_id: Option<String>,
    server_identity: Option<String>,
}

impl<I: CredentialIssuer> ClientHandshake<I, JsonCodec> {
    /// A handshake announcing [`PROTOCOL_VERSION`].
    pub fn new(issuer: I) -> Self {
        Self::with_codec(issuer, JsonCodec)
    }
}

impl<I: CredentialIssuer, C: Codec> ClientHandshake<I, C> {
    /// A handshake with a custom codec.
    pub fn with_codec(issuer: I, codec: C) -> Self {
        Self {
            issuer,
            codec,
            client_version: PROTOCOL_VERSION.to_string(),
            state: ClientState::Idle,
            retry_at: None,
            credential_outstanding: false,
            verified_id: None,
            server_identity: None,
        }
    }

    /// Overrides the version string sent in `hello`.
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The id the server verified, once authenticated.
    pub fn verified_id(&self) -> Option<&str> {
        self.verified_id.as_deref()
    }

    /// The server's identity hint from the last challenge.
    pub fn server_identity(&self) -> Option<&str> {
        self.server_identity.as_deref()
    }

    /// The credential issuer.
    pub fn issuer(&self) -> &I {
        &self.issuer
    }

    /// Sends `hello` once the link is ready. A failed send is retried after
    /// [`HELLO_RETRY_DELAY`], not on the next frame.
    pub fn update(&mut self, link: &impl Link) {
        if self.state != ClientState::Idle {
            return;
        }
        let now = Instant::now();
        if self.retry_at.is_some_and(|at| now < at) {
            return;
        }
        if !link.is_ready() {
            return;
        }

        let hello = HandshakeMessage::Hello(Hello {
            client_version: self.client_version.clone(),
        });
        match self.send(link, &hello) {
            Ok(()) => {
                self.state = ClientState::HelloSent;
                self.retry_at = None;
                tracing::debug!(version = %self.client_version, "hello sent");
            }
            Err(error) => {
                self.retry_at = Some(now + HELLO_RETRY_DELAY);
                tracing::warn!(%error, "hello failed, backing off");
            }
        }
    }

    /// Handles one message from the server.
    ///
    /// # Errors
    /// - [`ClientError::Protocol`] if the message doesn't decode
    /// - [`ClientError::Credential`] if no credential could be issued; the
    ///   handshake stays in `HelloSent`
    /// - [`ClientError::Transport`] if the ticket could not be sent; the
    ///   handshake goes back to `Idle` and backs off
    pub fn handle_message(
        &mut self,
        link: &impl Link,
        data: &[u8],
    ) -> Result<Option<ClientEvent>, ClientError> {
        let message: HandshakeMessage = self.codec.decode(data)?;
        match message {
            HandshakeMessage::Challenge(challenge) => {
                self.on_challenge(link, challenge)?;
                Ok(None)
            }
            HandshakeMessage::Result(result) => Ok(self.on_result(result)),
            other => {
                tracing::debug!(command = other.command(), "ignoring server-bound message");
                Ok(None)
            }
        }
    }

    /// Resets after the link dropped, so a reconnect starts cleanly.
    pub fn on_disconnect(&mut self) {
        self.release_credential();
        self.state = ClientState::Idle;
        self.retry_at = None;
        self.verified_id = None;
        self.server_identity = None;
        tracing::debug!("handshake reset after disconnect");
    }

    fn on_challenge(
        &mut self,
        link: &impl Link,
        challenge: Challenge,
    ) -> Result<(), ClientError> {
        if self.state != ClientState::HelloSent {
            tracing::debug!(state = ?self.state, "ignoring unexpected challenge");
            return Ok(());
        }
        if !self.issuer.supports(&challenge.provider) {
            tracing::warn!(provider = %challenge.provider, "unsupported provider, ignoring challenge");
            return Ok(());
        }

        self.state = ClientState::ChallengeReceived;
        self.server_identity = Some(challenge.server_identity_hint);

        // Never reuse a credential across challenges.
        self.release_credential();
        let (claimed_id, credential) = match self.issuer.issue_credential() {
            Ok(issued) => issued,
            Err(error) => {
                self.state = ClientState::HelloSent;
                return Err(error);
            }
        };
        self.credential_outstanding = true;

        let ticket =
            Ticket::new(challenge.provider, claimed_id, &credential, challenge.nonce);
        if let Err(error) = self.send(link, &HandshakeMessage::Ticket(ticket)) {
            self.release_credential();
            self.state = ClientState::Idle;
            self.retry_at = Some(Instant::now() + HELLO_RETRY_DELAY);
            return Err(error);
        }
        self.state = ClientState::TicketSent;
        tracing::debug!("ticket sent");
        Ok(())
    }

    fn on_result(&mut self, result: HandshakeResult) -> Option<ClientEvent> {
        if self.state.is_finished() {
            tracing::debug!(state = ?self.state, "ignoring result after handshake finished");
            return None;
        }

        if result.success {
            self.state = ClientState::Authenticated;
            self.verified_id =
                (!result.verified_id.is_empty()).then_some(result.verified_id);
            tracing::info!(verified_id = ?self.verified_id, "authenticated");
            Some(ClientEvent::Authenticated {
                verified_id: self.verified_id.clone(),
            })
        } else {
            self.state = ClientState::Failed;
            self.release_credential();
            tracing::warn!(reason = %result.message, "authentication refused");
            Some(ClientEvent::Rejected {
                message: result.message,
            })
        }
    }

    fn release_credential(&mut self) {
        if std::mem::take(&mut self.credential_outstanding) {
            self.issuer.cancel_credential();
        }
    }

    fn send(
        &self,
        link: &impl Link,
        message: &HandshakeMessage,
    ) -> Result<(), ClientError> {
        let bytes = self.codec.encode(message)?;
        link.send(&bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use warden_transport::{ConnectionId, TransportError};

    use super::*;

    // -- Helpers ----------------------------------------------------------

    #[derive(Default)]
    struct TestLink {
        ready: Cell<bool>,
        failing: Cell<bool>,
        sent: RefCell<Vec<HandshakeMessage>>,
    }

    impl TestLink {
        fn ready() -> Self {
            let link = Self::default();
            link.ready.set(true);
            link
        }

        fn take(&self) -> Vec<HandshakeMessage> {
            self.sent.borrow_mut().drain(..).collect()
        }
    }

    impl Link for TestLink {
        fn is_ready(&self) -> bool {
            self.ready.get()
        }

        fn send(&self, data: &[u8]) -> Result<(), TransportError> {
            if self.failing.get() {
                return Err(TransportError::ConnectionClosed(ConnectionId::new(0)));
            }
            self.sent.borrow_mut().push(JsonCodec.decode(data).unwrap());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Issuer {
        issued: u32,
        cancelled: u32,
    }

    impl CredentialIssuer for Issuer {
        fn supports(&self, provider: &str) -> bool {
            provider == "mock"
        }

        fn issue_credential(&mut self) -> Result<(String, Vec<u8>), ClientError> {
            self.issued += 1;
            Ok(("100".into(), vec![0xA1, 0xB2]))
        }

        fn cancel_credential(&mut self) {
            self.cancelled += 1;
        }
    }

    fn encode(message: HandshakeMessage) -> Vec<u8> {
        JsonCodec.encode(&message).unwrap()
    }

    fn challenge(provider: &str) -> Vec<u8> {
        encode(HandshakeMessage::Challenge(Challenge {
            provider: provider.into(),
            server_identity_hint: "srv".into(),
            nonce: "n1".into(),
        }))
    }

    fn result(success: bool, verified_id: &str) -> Vec<u8> {
        encode(HandshakeMessage::Result(HandshakeResult {
            success,
            message: if success { "ok".into() } else { "ticket has expired".into() },
            verified_id: verified_id.into(),
        }))
    }

    // =====================================================================
    // update()
    // =====================================================================

    #[test]
    fn test_update_waits_for_ready_link() {
        let link = TestLink::default();
        let mut hs = ClientHandshake::new(Issuer::default());

        hs.update(&link);
        assert_eq!(hs.state(), ClientState::Idle);

        link.ready.set(true);
        hs.update(&link);
        assert_eq!(hs.state(), ClientState::HelloSent);
        assert_eq!(
            link.take(),
            vec![HandshakeMessage::Hello(Hello { client_version: PROTOCOL_VERSION.into() })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_failed_hello_backs_off() {
        let link = TestLink::ready();
        link.failing.set(true);
        let mut hs = ClientHandshake::new(Issuer::default());

        hs.update(&link);
        assert_eq!(hs.state(), ClientState::Idle);

        link.failing.set(false);
        hs.update(&link);
        assert_eq!(hs.state(), ClientState::Idle, "no immediate retry");

        tokio::time::advance(HELLO_RETRY_DELAY).await;
        hs.update(&link);
        assert_eq!(hs.state(), ClientState::HelloSent);
    }

    // =====================================================================
    // handle_message()
    // =====================================================================

    #[test]
    fn test_handle_message_challenge_sends_ticket() {
        let link = TestLink::ready();
        let mut hs = ClientHandshake::new(Issuer::default());
        hs.update(&link);
        link.take();

        let event = hs.handle_message(&link, &challenge("mock")).unwrap();

        assert!(event.is_none());
        assert_eq!(hs.state(), ClientState::TicketSent);
        assert_eq!(hs.server_identity(), Some("srv"));
        assert_eq!(
            link.take(),
            vec![HandshakeMessage::Ticket(Ticket {
                provider: "mock".into(),
                claimed_id: "100".into(),
                ticket_hex: "a1b2".into(),
                nonce: "n1".into(),
            })]
        );
    }

    #[test]
    fn test_handle_message_unsupported_provider_stalls() {
        let link = TestLink::ready();
        let mut hs = ClientHandshake::new(Issuer::default());
        hs.update(&link);
        link.take();

        hs.handle_message(&link, &challenge("other")).unwrap();

        assert_eq!(hs.state(), ClientState::HelloSent);
        assert!(link.take().is_empty());
        assert_eq!(hs.issuer().issued, 0);
    }

    #[test]
    fn test_handle_message_challenge_before_hello_is_ignored() {
        let link = TestLink::ready();
        let mut hs = ClientHandshake::new(Issuer::default());

        hs.handle_message(&link, &challenge("mock")).unwrap();

        assert_eq!(hs.state(), ClientState::Idle);
    }

    #[test]
    fn test_handle_message_success_result_authenticates() {
        let link = TestLink::ready();
        let mut hs = ClientHandshake::new(Issuer::default());
        hs.update(&link);
        hs.handle_message(&link, &challenge("mock")).unwrap();

        let event = hs.handle_message(&link, &result(true, "100")).unwrap();

        assert_eq!(
            event,
            Some(ClientEvent::Authenticated { verified_id: Some("100".into()) })
        );
        assert_eq!(hs.verified_id(), Some("100"));
    }

    #[test]
    fn test_handle_message_result_while_idle_is_accepted() {
        // A server that needs no ticket answers before our hello.
        let link = TestLink::ready();
        let mut hs = ClientHandshake::new(Issuer::default());

        let event = hs.handle_message(&link, &result(true, "")).unwrap();

        assert_eq!(event, Some(ClientEvent::Authenticated { verified_id: None }));
        assert_eq!(hs.state(), ClientState::Authenticated);
    }

    #[test]
    fn test_handle_message_failure_does_not_retry() {
        let link = TestLink::ready();
        let mut hs = ClientHandshake::new(Issuer::default());
        hs.update(&link);
        hs.handle_message(&link, &challenge("mock")).unwrap();
        link.take();

        let event = hs.handle_message(&link, &result(false, "")).unwrap();
        hs.update(&link);
        hs.update(&link);

        assert!(matches!(event, Some(ClientEvent::Rejected { message }) if message.contains("expired")));
        assert_eq!(hs.state(), ClientState::Failed);
        assert!(link.take().is_empty());
        assert_eq!(hs.issuer().cancelled, 1);
    }

    #[test]
    fn test_handle_message_garbage_is_protocol_error() {
        let link = TestLink::ready();
        let mut hs = ClientHandshake::new(Issuer::default());

        let err = hs.handle_message(&link, b"nope").unwrap_err();

        assert!(matches!(err, ClientError::Protocol(_)));
    }

    // =====================================================================
    // on_disconnect()
    // =====================================================================

    #[test]
    fn test_on_disconnect_cancels_credential_and_resets() {
        let link = TestLink::ready();
        let mut hs = ClientHandshake::new(Issuer::default());
        hs.update(&link);
        hs.handle_message(&link, &challenge("mock")).unwrap();

        hs.on_disconnect();

        assert_eq!(hs.state(), ClientState::Idle);
        assert_eq!(hs.issuer().cancelled, 1);
        assert!(hs.server_identity().is_none());

        // A fresh connection starts over and issues a new credential.
        hs.update(&link);
        hs.handle_message(&link, &challenge("mock")).unwrap();
        assert_eq!(hs.issuer().issued, 2);
        assert_eq!(hs.issuer().cancelled, 1);
    }
}
