//! Lifecycle events and their subscriptions.
//!
//! The registry owns the observer list. Each subscriber gets its own
//! unbounded channel; a dropped receiver is pruned on the next emit, and
//! [`SessionRegistry::shutdown`](crate::SessionRegistry::shutdown) drops
//! every sender so receivers see the end of the stream.

use std::fmt;

use tokio::sync::mpsc;

use crate::{AuthenticationResult, Session};

/// Something that happened to a session. Carries a snapshot of the
/// session taken when the event was emitted.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session finished authenticating and was finalized. Emitted
    /// exactly once per session.
    Joined(Session),
    /// The connection closed and the session was removed.
    Left(Session),
    /// A claimed identity was attached, whatever the authentication outcome.
    IdentityBound(Session),
    /// An authentication attempt resolved.
    AuthenticationCompleted {
        session: Session,
        result: AuthenticationResult,
    },
}

impl SessionEvent {
    /// The session the event is about.
    pub fn session(&self) -> &Session {
        match self {
            Self::Joined(session)
            | Self::Left(session)
            | Self::IdentityBound(session)
            | Self::AuthenticationCompleted { session, .. } => session,
        }
    }
}

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// The receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Subscription {
    /// Pass to [`SessionRegistry::unsubscribe`](crate::SessionRegistry::unsubscribe).
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next event. `None` once the registry released the
    /// subscription.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// The next queued event, without waiting.
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Every queued event.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

/// Observer list owned by the registry.
#[derive(Debug, Default)]
pub(crate) struct Observers {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, mpsc::UnboundedSender<SessionEvent>)>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self) -> Subscription {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let (tx, events) = mpsc::unbounded_channel();
        self.subscribers.push((id, tx));
        tracing::debug!(subscription = %id, "subscribed to session events");
        Subscription { id, events }
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        before != self.subscribers.len()
    }

    pub(crate) fn emit(&mut self, event: SessionEvent) {
        self.subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}
