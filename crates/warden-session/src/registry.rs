//! The session registry: one [`Session`] per live connection.
//!
//! The registry is the only thing that mutates sessions. It:
//! - Creates sessions on whichever arrives first, the connection-opened
//!   event or a message for an untracked connection
//! - Answers `hello` with a `challenge` and turns `ticket`s into backend
//!   dispatches through the [`AuthOrchestrator`]
//! - Applies authentication results, finalizes joins exactly once, and
//!   closes connections that fail terminally
//! - Evicts sessions that stay unauthenticated past the timeout
//!
//! # Concurrency note
//!
//! Like the orchestrator and the backends, the registry is owned by the
//! tick loop and takes `&mut self` everywhere. Provider callbacks never
//! reach it directly; they arrive as completions drained in [`tick`].
//!
//! [`tick`]: SessionRegistry::tick

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use warden_protocol::{
    Challenge, Codec, HandshakeMessage, Hello, JsonCodec, Ticket,
};
use warden_transport::{ConnectionId, Transport, TransportEvent};

use crate::events::Observers;
use crate::{
    AuthError, AuthOrchestrator, AuthState, AuthTicket, AuthenticationResult,
    BeginOutcome, ClaimedIdentity, PermissionLevel, ServerContext, Session,
    SessionError, SessionEvent, Subscription, SubscriptionId,
};

/// Delay before a ticket refused with
/// [`AuthError::ProviderUnavailable`] is dispatched again.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// How long a closed session may wait for the transport's
/// [`TransportEvent::Closed`] before the registry reaps it itself.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Tracks every session and drives its handshake.
///
/// ## Lifecycle
///
/// ```text
/// opened / claim / hello ──→ [Unauthenticated] ──ticket──→ [Pending]
///          │                        │                          │
///     (no auth needed)          (timeout)              (completion)
///          │                        │                   │          │
///          ▼                        ▼                   ▼          ▼
///   [Authenticated] ◀──────── [Rejected] ◀──────── failure    success
///          │                                                       │
///          └───────────── finalize (Joined, once) ◀────────────────┘
/// ```
pub struct SessionRegistry<T: Transport, C: Codec = JsonCodec> {
    ctx: Arc<ServerContext>,
    orchestrator: AuthOrchestrator,
    transport: T,
    codec: C,
    sessions: HashMap<ConnectionId, Session>,
    observers: Observers,
}

impl<T: Transport> SessionRegistry<T, JsonCodec> {
    /// Creates an empty registry speaking JSON.
    pub fn new(
        ctx: Arc<ServerContext>,
        orchestrator: AuthOrchestrator,
        transport: T,
    ) -> Self {
        Self::with_codec(ctx, orchestrator, transport, JsonCodec)
    }
}

impl<T: Transport, C: Codec> SessionRegistry<T, C> {
    /// Creates an empty registry with a custom codec.
    pub fn with_codec(
        ctx: Arc<ServerContext>,
        orchestrator: AuthOrchestrator,
        transport: T,
        codec: C,
    ) -> Self {
        Self {
            ctx,
            orchestrator,
            transport,
            codec,
            sessions: HashMap::new(),
            observers: Observers::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Starts receiving [`SessionEvent`]s.
    pub fn subscribe(&mut self) -> Subscription {
        self.observers.subscribe()
    }

    /// Releases a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Transport-facing entry points
    // -----------------------------------------------------------------------

    /// Routes one transport event.
    ///
    /// # Errors
    /// Returns [`SessionError::CapacityExceeded`] when a new connection was
    /// refused because the server is full.
    pub fn handle_event(
        &mut self,
        event: TransportEvent,
    ) -> Result<(), SessionError> {
        match event {
            TransportEvent::Opened(conn) => self.on_connection_opened(conn),
            TransportEvent::Closed(conn) => {
                self.on_connection_closed(conn);
                Ok(())
            }
            TransportEvent::Message(conn, data) => {
                self.handle_message(conn, &data)
            }
        }
    }

    /// A transport connection opened.
    ///
    /// If a claim or message already created the session, it is kept as
    /// is. Otherwise a session is created, unless the server is full.
    ///
    /// # Errors
    /// Returns [`SessionError::CapacityExceeded`] if the connection was
    /// refused. The client was sent a failure result and closed.
    pub fn on_connection_opened(
        &mut self,
        conn: ConnectionId,
    ) -> Result<(), SessionError> {
        if self.sessions.contains_key(&conn) {
            tracing::debug!(%conn, "connection opened for existing session");
            return Ok(());
        }
        self.admit(conn)
    }

    /// A transport connection closed. Removes the session, ends its backend
    /// session and emits [`SessionEvent::Left`].
    pub fn on_connection_closed(
        &mut self,
        conn: ConnectionId,
    ) -> Option<Session> {
        let Some(mut session) = self.sessions.remove(&conn) else {
            tracing::debug!(%conn, "close for untracked connection");
            return None;
        };

        if let Some(identity) = session.backend_identity.take() {
            self.orchestrator.end_session(&identity, conn);
        }
        session.ticket = None;

        tracing::info!(
            %conn,
            state = ?session.auth_state(),
            verified = ?session.verified().map(|id| id.as_str()),
            "session left"
        );
        self.observers.emit(SessionEvent::Left(session.clone()));
        Some(session)
    }

    /// The game layer reported who the client says it is.
    ///
    /// A claim carrying only empty values never replaces anything. If the
    /// claim changes the record, [`SessionEvent::IdentityBound`] is
    /// emitted. A verified identity is never touched by a claim.
    ///
    /// # Errors
    /// Returns [`SessionError::CapacityExceeded`] if this claim would
    /// create a session on a full server.
    pub fn on_identity_claimed(
        &mut self,
        conn: ConnectionId,
        claimed: ClaimedIdentity,
    ) -> Result<(), SessionError> {
        if !self.sessions.contains_key(&conn) {
            self.admit(conn)?;
        }
        let session = self
            .sessions
            .get_mut(&conn)
            .ok_or(SessionError::NotFound(conn))?;

        if claimed.is_placeholder() {
            tracing::debug!(%conn, status = ?session.identity_status(), "ignoring empty identity claim");
            return Ok(());
        }

        if session.claim(claimed) {
            tracing::info!(
                %conn,
                claimed_id = %session.claimed().map(|c| c.id.as_str()).unwrap_or_default(),
                "identity claimed"
            );
            let snapshot = session.clone();
            self.observers.emit(SessionEvent::IdentityBound(snapshot));
        }

        self.consider_dispatch(conn);
        Ok(())
    }

    /// Decodes and routes one handshake message. Undecodable input and
    /// server-to-client commands are logged and ignored.
    ///
    /// # Errors
    /// Returns [`SessionError::CapacityExceeded`] if the message arrived
    /// for an untracked connection on a full server.
    pub fn handle_message(
        &mut self,
        conn: ConnectionId,
        data: &[u8],
    ) -> Result<(), SessionError> {
        let message: HandshakeMessage = match self.codec.decode(data) {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!(%conn, %error, "ignoring undecodable handshake message");
                return Ok(());
            }
        };

        match message {
            HandshakeMessage::Hello(hello) => self.on_hello(conn, hello),
            HandshakeMessage::Ticket(ticket) => self.on_ticket(conn, ticket),
            other => {
                tracing::debug!(%conn, command = other.command(), "ignoring client-bound message from client");
                Ok(())
            }
        }
    }

    /// The client opened the handshake.
    ///
    /// Answers with a `challenge` carrying a fresh nonce. A session that is
    /// already authenticated gets its `result` again instead.
    ///
    /// # Errors
    /// See [`handle_message`](Self::handle_message).
    pub fn on_hello(
        &mut self,
        conn: ConnectionId,
        hello: Hello,
    ) -> Result<(), SessionError> {
        if !self.sessions.contains_key(&conn) {
            self.admit(conn)?;
        }
        let session = self
            .sessions
            .get_mut(&conn)
            .ok_or(SessionError::NotFound(conn))?;
        session.client_version = Some(hello.client_version.clone());

        if session.tearing_down || session.auth_state() == AuthState::Rejected {
            tracing::debug!(%conn, "ignoring hello from rejected session");
            return Ok(());
        }

        if session.auth_state() == AuthState::Authenticated {
            let result = match session.verified() {
                Some(identity) => AuthenticationResult::verified(identity.clone()),
                None => AuthenticationResult::not_required(),
            };
            tracing::debug!(%conn, "repeat hello from authenticated session, resending result");
            self.send(conn, &HandshakeMessage::Result(result.to_wire()));
            return Ok(());
        }

        if let Some(expected) = &self.ctx.settings().required_client_version {
            if *expected != hello.client_version {
                let error = AuthError::VersionMismatch {
                    expected: expected.clone(),
                    got: hello.client_version,
                };
                self.apply_result(conn, AuthenticationResult::failed(error));
                return Ok(());
            }
        }

        if session.in_flight {
            tracing::debug!(%conn, "hello while validation in flight, ignoring");
            return Ok(());
        }

        let nonce = generate_nonce();
        session.nonce = Some(nonce.clone());
        let challenge = Challenge {
            provider: self.orchestrator.provider().to_string(),
            server_identity_hint: self.ctx.settings().server_identity.clone(),
            nonce,
        };
        tracing::debug!(%conn, provider = %challenge.provider, "challenge issued");
        self.send(conn, &HandshakeMessage::Challenge(challenge));
        Ok(())
    }

    /// The client answered a challenge.
    ///
    /// A ticket with an unknown nonce, the wrong provider tag or a bad
    /// payload is malformed: logged and ignored. A good ticket records the
    /// claimed id and is dispatched.
    ///
    /// # Errors
    /// See [`handle_message`](Self::handle_message).
    pub fn on_ticket(
        &mut self,
        conn: ConnectionId,
        ticket: Ticket,
    ) -> Result<(), SessionError> {
        if !self.sessions.contains_key(&conn) {
            self.admit(conn)?;
        }
        let session = self
            .sessions
            .get_mut(&conn)
            .ok_or(SessionError::NotFound(conn))?;

        if !session.is_awaiting_auth() {
            tracing::debug!(%conn, state = ?session.auth_state(), "ignoring ticket, session not awaiting auth");
            return Ok(());
        }
        if session.in_flight {
            tracing::debug!(%conn, "ignoring ticket, validation already in flight");
            return Ok(());
        }

        let ticket_in = match AuthTicket::from_wire(&ticket) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::debug!(%conn, %error, "ignoring ticket");
                return Ok(());
            }
        };
        if session.nonce.as_deref() != Some(ticket_in.nonce.as_str()) {
            tracing::debug!(%conn, "ignoring ticket with unknown nonce");
            return Ok(());
        }
        if ticket_in.provider != self.orchestrator.provider() {
            tracing::debug!(%conn, provider = %ticket_in.provider, "ignoring ticket for another provider");
            return Ok(());
        }

        // One ticket per challenge.
        session.nonce = None;
        session.retry_at = None;
        let display_name = session
            .claimed()
            .map(|c| c.display_name.clone())
            .unwrap_or_default();
        let claimed = ClaimedIdentity::new(ticket_in.claimed_id.clone(), display_name);
        session.ticket = Some(ticket_in);

        self.on_identity_claimed(conn, claimed)
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// One scheduler frame: applies backend completions, evicts sessions
    /// past the handshake timeout, re-dispatches tickets whose retry
    /// deadline passed, and reaps closed sessions the transport never
    /// reported.
    pub fn tick(&mut self) {
        for completion in self.orchestrator.tick() {
            self.apply_result(completion.connection, completion.result);
        }

        let now = Instant::now();
        let timeout = self.ctx.settings().auth_timeout();

        let mut expired: Vec<ConnectionId> = self
            .sessions
            .values()
            .filter(|s| s.handshake_expired(now, timeout))
            .map(Session::connection)
            .collect();
        expired.sort();
        for conn in expired {
            tracing::warn!(%conn, timeout_secs = timeout.as_secs(), "handshake timed out");
            self.apply_result(
                conn,
                AuthenticationResult::failed(AuthError::HandshakeTimeout),
            );
        }

        let mut due: Vec<ConnectionId> = self
            .sessions
            .values()
            .filter(|s| {
                s.ticket.is_some()
                    && !s.in_flight
                    && s.retry_at.is_some_and(|at| at <= now)
            })
            .map(Session::connection)
            .collect();
        due.sort();
        for conn in due {
            tracing::debug!(%conn, "retrying ticket dispatch");
            self.consider_dispatch(conn);
        }

        self.reap_unclosed(now);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The session for `conn`.
    pub fn get(&self, conn: ConnectionId) -> Option<&Session> {
        self.sessions.get(&conn)
    }

    /// Every tracked session, in no particular order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The permission level of the session on `conn`.
    pub fn permission_level(&self, conn: ConnectionId) -> PermissionLevel {
        self.sessions
            .get(&conn)
            .map_or(PermissionLevel::None, |s| {
                self.ctx.permissions().session_level(s)
            })
    }

    /// The shared context.
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// The transport the registry sends through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The orchestrator.
    pub fn orchestrator(&self) -> &AuthOrchestrator {
        &self.orchestrator
    }

    /// Mutable access to the orchestrator, e.g. to initialize it eagerly.
    pub fn orchestrator_mut(&mut self) -> &mut AuthOrchestrator {
        &mut self.orchestrator
    }

    /// Ends every backend session and releases all subscriptions. Sessions
    /// stay tracked until their connections close.
    pub fn shutdown(&mut self) {
        for session in self.sessions.values_mut() {
            session.backend_identity = None;
            session.ticket = None;
        }
        self.orchestrator.shutdown();
        tracing::info!(
            sessions = self.sessions.len(),
            subscribers = self.observers.len(),
            "session registry shut down"
        );
        self.observers.clear();
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Creates a session for `conn`, or refuses it if the server is full.
    fn admit(&mut self, conn: ConnectionId) -> Result<(), SessionError> {
        let max = self.ctx.settings().max_players;
        if self.sessions.len() >= max {
            tracing::warn!(%conn, max, "server full, refusing connection");
            let result =
                AuthenticationResult::failed(AuthError::CapacityExceeded { max });
            self.send(conn, &HandshakeMessage::Result(result.to_wire()));
            self.close(conn, &result.message);
            return Err(SessionError::CapacityExceeded { max });
        }

        let loopback = self.transport.locality(conn).is_loopback();
        let mut session = Session::new(conn, Instant::now(), loopback);
        let needs_auth = self.orchestrator.requires_authentication(loopback);
        session.bypassed = !needs_auth;
        self.sessions.insert(conn, session);
        tracing::info!(%conn, loopback, needs_auth, "session created");

        if !needs_auth {
            self.apply_result(conn, AuthenticationResult::not_required());
        }
        Ok(())
    }

    /// Dispatches the session's stored ticket if it is eligible.
    fn consider_dispatch(&mut self, conn: ConnectionId) {
        let now = Instant::now();
        let Some(session) = self.sessions.get_mut(&conn) else {
            return;
        };
        if !session.is_awaiting_auth() || session.in_flight {
            return;
        }
        if session.retry_at.is_some_and(|at| now < at) {
            return;
        }
        let Some(ticket) = session.ticket.take() else {
            return;
        };
        session.retry_at = None;

        if self.ctx.permissions().denies(&ticket.claimed_id) {
            tracing::warn!(%conn, claimed_id = %ticket.claimed_id, "claimed identity is banned");
            self.apply_result(conn, AuthenticationResult::failed(AuthError::Banned));
            return;
        }

        let claimed_id = ticket.claimed_id.clone();
        match self.orchestrator.begin_authentication(conn, ticket.clone()) {
            BeginOutcome::Pending => {
                session.in_flight = true;
                session.backend_identity = Some(claimed_id.clone());
                session.advance(AuthState::Pending);
                tracing::info!(%conn, %claimed_id, "authentication pending");
            }
            BeginOutcome::Immediate(result) => {
                if result.error.as_ref().is_some_and(AuthError::is_retryable) {
                    session.ticket = Some(ticket);
                    session.retry_at = Some(now + RETRY_DELAY);
                }
                self.apply_result(conn, result);
            }
        }
    }

    /// Applies one authentication result to the session on `conn`.
    fn apply_result(&mut self, conn: ConnectionId, result: AuthenticationResult) {
        let Some(session) = self.sessions.get_mut(&conn) else {
            tracing::debug!(%conn, "dropping result for departed connection");
            return;
        };
        if session.tearing_down {
            tracing::debug!(%conn, "dropping result for session being closed");
            return;
        }
        session.in_flight = false;

        // A banned identity never gets in, whatever the backend said.
        let mut result = result;
        let banned = result
            .verified_identity
            .as_ref()
            .is_some_and(|id| self.ctx.permissions().is_banned(id));
        if result.success && banned {
            tracing::warn!(%conn, "verified identity is banned");
            if let Some(identity) = session.backend_identity.take() {
                self.orchestrator.end_session(&identity, conn);
            }
            result = AuthenticationResult::failed(AuthError::Banned);
        }

        if result.success {
            if let Some(identity) = &result.verified_identity {
                if !session.verify(identity.clone()) {
                    tracing::warn!(%conn, "verified identity already set, keeping the original");
                }
            }
            session.advance(AuthState::Authenticated);
            tracing::info!(%conn, message = %result.message, "authentication succeeded");
            let snapshot = session.clone();
            self.observers.emit(SessionEvent::AuthenticationCompleted {
                session: snapshot,
                result: result.clone(),
            });
            self.finalize(conn, &result);
            return;
        }

        // The backend already forgot identities it rejected.
        if matches!(result.error, Some(AuthError::ProviderRejected(_))) {
            session.backend_identity = None;
        }

        if result.should_disconnect {
            session.advance(AuthState::Rejected);
            session.tearing_down = true;
            session.close_requested_at = Some(Instant::now());
            session.ticket = None;
            tracing::warn!(%conn, reason = %result.message, "authentication failed, disconnecting");
        } else {
            tracing::info!(%conn, reason = %result.message, "authentication attempt failed, session stays retryable");
        }

        let snapshot = session.clone();
        self.observers.emit(SessionEvent::AuthenticationCompleted {
            session: snapshot,
            result: result.clone(),
        });

        if result.should_disconnect {
            self.send(conn, &HandshakeMessage::Result(result.to_wire()));
            self.close(conn, &result.message);
        }
    }

    /// Settles sessions whose close got no [`TransportEvent::Closed`]
    /// within [`CLOSE_GRACE`]: a dead connection is treated as closed, a
    /// live one is asked to close again.
    fn reap_unclosed(&mut self, now: Instant) {
        let mut stale: Vec<ConnectionId> = self
            .sessions
            .values()
            .filter(|s| {
                s.close_requested_at
                    .is_some_and(|at| now.saturating_duration_since(at) >= CLOSE_GRACE)
            })
            .map(Session::connection)
            .collect();
        stale.sort();
        for conn in stale {
            if self.transport.is_active(conn) {
                tracing::warn!(%conn, "connection still open after close, closing again");
                if let Some(session) = self.sessions.get_mut(&conn) {
                    session.close_requested_at = Some(now);
                }
                self.close(conn, "session closed");
            } else {
                tracing::warn!(%conn, "transport never reported close, reaping session");
                self.on_connection_closed(conn);
            }
        }
    }

    /// Runs the join finalization once: tells the client and emits
    /// [`SessionEvent::Joined`].
    fn finalize(&mut self, conn: ConnectionId, result: &AuthenticationResult) {
        let Some(session) = self.sessions.get_mut(&conn) else {
            return;
        };
        if session.join_completed {
            return;
        }
        session.join_completed = true;
        let snapshot = session.clone();

        self.send(conn, &HandshakeMessage::Result(result.to_wire()));
        tracing::info!(
            %conn,
            verified = ?snapshot.verified().map(|id| id.as_str()),
            loopback = snapshot.is_loopback(),
            "session joined"
        );
        self.observers.emit(SessionEvent::Joined(snapshot));
    }

    fn send(&self, conn: ConnectionId, message: &HandshakeMessage) {
        let bytes = match self.codec.encode(message) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::error!(%conn, %error, "failed to encode handshake message");
                return;
            }
        };
        if let Err(error) = self.transport.send(conn, &bytes) {
            tracing::debug!(%conn, %error, command = message.command(), "send failed");
        }
    }

    fn close(&self, conn: ConnectionId, reason: &str) {
        if let Err(error) = self.transport.close(conn, reason) {
            tracing::debug!(%conn, %error, "close failed");
        }
    }
}

/// A fresh handshake nonce: 16 random bytes, hex encoded.
fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Registry unit tests on the no-auth backend and a memory transport.
    //! Provider-driven scenarios live in `tests/registry.rs`.

    use warden_protocol::HandshakeResult;
    use warden_transport::{Locality, MemoryTransport};

    use super::*;
    use crate::{NoAuthBackend, RemoteValidationStub, ServerSettings};

    // -- Helpers ----------------------------------------------------------

    fn registry_with(
        settings: ServerSettings,
    ) -> (SessionRegistry<MemoryTransport>, MemoryTransport) {
        let ctx = Arc::new(ServerContext::new(settings));
        let mut orchestrator = AuthOrchestrator::new(NoAuthBackend, &ctx);
        orchestrator.initialize().unwrap();
        let transport = MemoryTransport::new();
        (
            SessionRegistry::new(ctx, orchestrator, transport.clone()),
            transport,
        )
    }

    fn registry() -> (SessionRegistry<MemoryTransport>, MemoryTransport) {
        registry_with(ServerSettings::default())
    }

    fn sent(transport: &MemoryTransport, conn: ConnectionId) -> Vec<HandshakeMessage> {
        transport
            .take_sent(conn)
            .iter()
            .map(|bytes| JsonCodec.decode(bytes).unwrap())
            .collect()
    }

    fn challenge_nonce(transport: &MemoryTransport, conn: ConnectionId) -> String {
        sent(transport, conn)
            .into_iter()
            .find_map(|m| match m {
                HandshakeMessage::Challenge(c) => Some(c.nonce),
                _ => None,
            })
            .expect("challenge was sent")
    }

    fn hello() -> Hello {
        Hello { client_version: "1".into() }
    }

    // =====================================================================
    // on_connection_opened()
    // =====================================================================

    #[test]
    fn test_on_connection_opened_auth_disabled_authenticates_immediately() {
        let (mut reg, transport) = registry_with(ServerSettings {
            require_authentication: false,
            ..ServerSettings::default()
        });
        let conn = transport.open(Locality::Remote);

        reg.on_connection_opened(conn).unwrap();

        let session = reg.get(conn).unwrap();
        assert_eq!(session.auth_state(), AuthState::Authenticated);
        assert!(session.join_completed());
        assert_eq!(
            sent(&transport, conn),
            vec![HandshakeMessage::Result(HandshakeResult {
                success: true,
                message: "authentication not required".into(),
                verified_id: String::new(),
            })]
        );
    }

    #[test]
    fn test_on_connection_opened_remote_waits_for_ticket() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Remote);

        reg.on_connection_opened(conn).unwrap();

        assert_eq!(reg.get(conn).unwrap().auth_state(), AuthState::Unauthenticated);
        assert!(transport.take_sent(conn).is_empty());
    }

    #[test]
    fn test_on_connection_opened_loopback_is_administrator() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Loopback);

        reg.on_connection_opened(conn).unwrap();

        assert!(reg.get(conn).unwrap().is_bypassed());
        assert_eq!(reg.permission_level(conn), PermissionLevel::Administrator);
    }

    #[test]
    fn test_on_connection_opened_at_capacity_refuses() {
        let (mut reg, transport) = registry_with(ServerSettings {
            max_players: 1,
            ..ServerSettings::default()
        });
        let first = transport.open(Locality::Remote);
        let second = transport.open(Locality::Remote);
        reg.on_connection_opened(first).unwrap();

        let err = reg.on_connection_opened(second).unwrap_err();

        assert!(matches!(err, SessionError::CapacityExceeded { max: 1 }));
        assert!(reg.get(second).is_none());
        assert_eq!(transport.close_count(second), 1);
        let messages = sent(&transport, second);
        assert!(matches!(&messages[..], [HandshakeMessage::Result(r)] if !r.success));
    }

    #[test]
    fn test_on_connection_opened_twice_keeps_one_session() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Remote);

        reg.on_connection_opened(conn).unwrap();
        reg.on_connection_opened(conn).unwrap();

        assert_eq!(reg.len(), 1);
    }

    // =====================================================================
    // on_identity_claimed()
    // =====================================================================

    #[test]
    fn test_on_identity_claimed_before_open_creates_session() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Remote);
        let mut events = reg.subscribe();

        reg.on_identity_claimed(conn, ClaimedIdentity::new("5", "Eve")).unwrap();
        reg.on_connection_opened(conn).unwrap();

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(conn).unwrap().claimed().unwrap().id, "5");
        assert!(matches!(
            events.drain().as_slice(),
            [SessionEvent::IdentityBound(_)]
        ));
    }

    #[test]
    fn test_on_identity_claimed_placeholder_is_ignored() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Remote);
        reg.on_identity_claimed(conn, ClaimedIdentity::new("5", "Eve")).unwrap();

        reg.on_identity_claimed(conn, ClaimedIdentity::default()).unwrap();

        assert_eq!(reg.get(conn).unwrap().claimed().unwrap().id, "5");
    }

    // =====================================================================
    // on_hello() / on_ticket()
    // =====================================================================

    #[test]
    fn test_on_hello_sends_challenge_with_provider_and_hint() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Remote);

        reg.on_hello(conn, hello()).unwrap();

        let messages = sent(&transport, conn);
        let [HandshakeMessage::Challenge(challenge)] = messages.as_slice() else {
            panic!("expected a challenge, got {messages:?}");
        };
        assert_eq!(challenge.provider, "none");
        assert_eq!(challenge.server_identity_hint, "warden-server");
        assert_eq!(challenge.nonce.len(), 32);
    }

    #[test]
    fn test_on_ticket_no_auth_backend_verifies_claim() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Remote);
        reg.on_connection_opened(conn).unwrap();
        reg.on_hello(conn, hello()).unwrap();
        let nonce = challenge_nonce(&transport, conn);

        reg.on_ticket(conn, Ticket::new("none", "77", &[1, 2], nonce)).unwrap();

        let session = reg.get(conn).unwrap();
        assert_eq!(session.auth_state(), AuthState::Authenticated);
        assert_eq!(session.verified().unwrap().as_str(), "77");
        assert_eq!(reg.permission_level(conn), PermissionLevel::Player);
    }

    #[test]
    fn test_on_ticket_wrong_nonce_is_ignored() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Remote);
        reg.on_hello(conn, hello()).unwrap();
        transport.take_sent(conn);

        reg.on_ticket(conn, Ticket::new("none", "77", &[1], "stale")).unwrap();

        let session = reg.get(conn).unwrap();
        assert_eq!(session.auth_state(), AuthState::Unauthenticated);
        assert!(session.claimed().is_none());
        assert!(transport.take_sent(conn).is_empty());
    }

    #[test]
    fn test_on_hello_version_mismatch_disconnects() {
        let (mut reg, transport) = registry_with(ServerSettings {
            required_client_version: Some("2".into()),
            ..ServerSettings::default()
        });
        let conn = transport.open(Locality::Remote);

        reg.on_hello(conn, hello()).unwrap();

        assert_eq!(reg.get(conn).unwrap().auth_state(), AuthState::Rejected);
        assert_eq!(transport.close_count(conn), 1);
        let messages = sent(&transport, conn);
        assert!(matches!(&messages[..], [HandshakeMessage::Result(r)] if r.message.contains("version")));
    }

    #[test]
    fn test_on_hello_after_authentication_resends_result() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Loopback);
        reg.on_connection_opened(conn).unwrap();
        transport.take_sent(conn);

        reg.on_hello(conn, hello()).unwrap();

        let messages = sent(&transport, conn);
        assert!(matches!(&messages[..], [HandshakeMessage::Result(r)] if r.success));
    }

    #[test]
    fn test_handle_message_garbage_is_ignored() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Remote);
        reg.on_connection_opened(conn).unwrap();

        reg.handle_message(conn, b"{not json").unwrap();

        assert_eq!(reg.get(conn).unwrap().auth_state(), AuthState::Unauthenticated);
    }

    #[test]
    fn test_on_ticket_remote_stub_rejects_with_not_implemented() {
        let ctx = Arc::new(ServerContext::default());
        let mut orchestrator = AuthOrchestrator::new(RemoteValidationStub, &ctx);
        orchestrator.initialize().unwrap();
        let transport = MemoryTransport::new();
        let mut reg = SessionRegistry::new(ctx, orchestrator, transport.clone());
        let conn = transport.open(Locality::Remote);
        reg.on_hello(conn, hello()).unwrap();
        let nonce = challenge_nonce(&transport, conn);

        reg.on_ticket(conn, Ticket::new("remote", "1", &[9], nonce)).unwrap();

        assert_eq!(reg.get(conn).unwrap().auth_state(), AuthState::Rejected);
        let messages = sent(&transport, conn);
        assert!(matches!(&messages[..], [HandshakeMessage::Result(r)] if r.message.contains("not implemented")));
    }

    // =====================================================================
    // on_connection_closed() / shutdown()
    // =====================================================================

    #[test]
    fn test_on_connection_closed_emits_left() {
        let (mut reg, transport) = registry();
        let conn = transport.open(Locality::Remote);
        reg.on_connection_opened(conn).unwrap();
        let mut events = reg.subscribe();

        let removed = reg.on_connection_closed(conn);

        assert!(removed.is_some());
        assert!(reg.is_empty());
        assert!(matches!(events.drain().as_slice(), [SessionEvent::Left(_)]));
        assert!(reg.on_connection_closed(conn).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_ends_subscriptions() {
        let (mut reg, _transport) = registry();
        let mut events = reg.subscribe();

        reg.shutdown();

        assert!(events.next().await.is_none());
    }
}
