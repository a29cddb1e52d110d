//! Transport collaborator contract for Warden.
//!
//! Warden does not accept sockets itself. Whatever network layer the host
//! uses (WebSocket, a game engine's peer API, an in-process pipe) is
//! wrapped in the [`Transport`] trait: it reports connection lifecycle
//! transitions and inbound messages as [`TransportEvent`]s and carries
//! outbound bytes for a [`ConnectionId`].
//!
//! The client half of a connection is abstracted by [`Link`].
//!
//! [`MemoryTransport`] is a complete in-process implementation used by
//! the embedded loopback client, the demo, and the test suites.

mod error;
mod memory;

pub use error::TransportError;
pub use memory::{MemoryLink, MemoryTransport};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a connection originates, as reported by the transport.
///
/// The transport is the only component that knows whether a peer is the
/// server's own embedded client, so it states it explicitly instead of
/// the session layer inferring it from addresses or sentinel ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locality {
    /// A remote player.
    #[default]
    Remote,
    /// The server's own embedded client.
    Loopback,
}

impl Locality {
    /// Returns `true` for [`Locality::Loopback`].
    pub fn is_loopback(self) -> bool {
        matches!(self, Self::Loopback)
    }
}

/// A connection state transition or inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer connected.
    Opened(ConnectionId),
    /// A peer disconnected (either side initiated).
    Closed(ConnectionId),
    /// An ordered, reliable message arrived from a peer.
    Message(ConnectionId, Vec<u8>),
}

/// Server-side view of the network layer.
///
/// Methods take `&self`: implementations own their synchronization so a
/// transport handle can be shared with the code that feeds it.
pub trait Transport: Send + Sync + 'static {
    /// Lists every connection the transport currently considers open.
    fn connections(&self) -> Vec<ConnectionId>;

    /// Sends data to the peer.
    fn send(
        &self,
        conn: ConnectionId,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Returns `true` while the connection can carry messages.
    fn is_active(&self, conn: ConnectionId) -> bool;

    /// Locality hint for the connection.
    fn locality(&self, conn: ConnectionId) -> Locality;

    /// Closes the connection. The matching [`TransportEvent::Closed`] is
    /// reported through [`poll_events`](Self::poll_events).
    fn close(
        &self,
        conn: ConnectionId,
        reason: &str,
    ) -> Result<(), TransportError>;

    /// Drains the events that accumulated since the last call, in order.
    fn poll_events(&self) -> Vec<TransportEvent>;
}

/// Client-side view of a single connection to the server.
pub trait Link {
    /// Returns `true` once the connection can carry messages.
    fn is_ready(&self) -> bool;

    /// Sends data to the server.
    fn send(&self, data: &[u8]) -> Result<(), TransportError>;
}
