//! In-process transport.
//!
//! Both ends of every connection live in the same process: the server side
//! is driven through the [`Transport`] trait, the client side through a
//! [`MemoryLink`]. Outbound server messages queue per connection until
//! the owner collects them with [`MemoryTransport::take_sent`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    ConnectionId, Link, Locality, Transport, TransportError, TransportEvent,
};

#[derive(Debug)]
struct Peer {
    locality: Locality,
    active: bool,
    outbox: Vec<Vec<u8>>,
    close_count: usize,
    close_reason: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    peers: HashMap<ConnectionId, Peer>,
    events: VecDeque<TransportEvent>,
}

/// A [`Transport`] whose peers are in the same process.
///
/// Cloning is cheap and every clone observes the same connections.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransport {
    /// Creates a transport with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new connection and queues its [`TransportEvent::Opened`].
    pub fn open(&self, locality: Locality) -> ConnectionId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let conn = ConnectionId::new(inner.next_id);
        inner.peers.insert(
            conn,
            Peer {
                locality,
                active: true,
                outbox: Vec::new(),
                close_count: 0,
                close_reason: None,
            },
        );
        inner.events.push_back(TransportEvent::Opened(conn));
        tracing::debug!(%conn, ?locality, "memory connection opened");
        conn
    }

    /// Queues an inbound message from the client side of `conn`.
    pub fn deliver(
        &self,
        conn: ConnectionId,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        let peer = inner
            .peers
            .get(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        if !peer.active {
            return Err(TransportError::ConnectionClosed(conn));
        }
        inner
            .events
            .push_back(TransportEvent::Message(conn, data.to_vec()));
        Ok(())
    }

    /// Simulates the client hanging up.
    pub fn disconnect(&self, conn: ConnectionId) {
        let mut inner = self.inner.lock();
        let closed = match inner.peers.get_mut(&conn) {
            Some(peer) if peer.active => {
                peer.active = false;
                true
            }
            _ => false,
        };
        if closed {
            inner.events.push_back(TransportEvent::Closed(conn));
        }
    }

    /// Removes and returns everything the server sent to `conn` so far.
    pub fn take_sent(&self, conn: ConnectionId) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .peers
            .get_mut(&conn)
            .map(|peer| std::mem::take(&mut peer.outbox))
            .unwrap_or_default()
    }

    /// How many times the server asked to close `conn`.
    pub fn close_count(&self, conn: ConnectionId) -> usize {
        self.inner
            .lock()
            .peers
            .get(&conn)
            .map_or(0, |peer| peer.close_count)
    }

    /// The reason given by the first server-side close of `conn`.
    pub fn close_reason(&self, conn: ConnectionId) -> Option<String> {
        self.inner
            .lock()
            .peers
            .get(&conn)
            .and_then(|peer| peer.close_reason.clone())
    }

    /// Returns the client end of `conn`.
    pub fn link(&self, conn: ConnectionId) -> MemoryLink {
        MemoryLink {
            transport: self.clone(),
            conn,
        }
    }
}

impl Transport for MemoryTransport {
    fn connections(&self) -> Vec<ConnectionId> {
        let inner = self.inner.lock();
        let mut open: Vec<_> = inner
            .peers
            .iter()
            .filter(|(_, peer)| peer.active)
            .map(|(conn, _)| *conn)
            .collect();
        open.sort();
        open
    }

    fn send(
        &self,
        conn: ConnectionId,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        let peer = inner
            .peers
            .get_mut(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        if !peer.active {
            return Err(TransportError::ConnectionClosed(conn));
        }
        peer.outbox.push(data.to_vec());
        Ok(())
    }

    fn is_active(&self, conn: ConnectionId) -> bool {
        self.inner
            .lock()
            .peers
            .get(&conn)
            .is_some_and(|peer| peer.active)
    }

    fn locality(&self, conn: ConnectionId) -> Locality {
        self.inner
            .lock()
            .peers
            .get(&conn)
            .map(|peer| peer.locality)
            .unwrap_or_default()
    }

    fn close(
        &self,
        conn: ConnectionId,
        reason: &str,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        let peer = inner
            .peers
            .get_mut(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        peer.close_count += 1;
        if peer.close_reason.is_none() {
            peer.close_reason = Some(reason.to_string());
        }
        if peer.active {
            peer.active = false;
            inner.events.push_back(TransportEvent::Closed(conn));
            tracing::debug!(%conn, %reason, "memory connection closed");
        }
        Ok(())
    }

    fn poll_events(&self) -> Vec<TransportEvent> {
        self.inner.lock().events.drain(..).collect()
    }
}

/// Client end of a [`MemoryTransport`] connection.
#[derive(Debug, Clone)]
pub struct MemoryLink {
    transport: MemoryTransport,
    conn: ConnectionId,
}

impl MemoryLink {
    /// The connection this link belongs to.
    pub fn connection(&self) -> ConnectionId {
        self.conn
    }
}

impl Link for MemoryLink {
    fn is_ready(&self) -> bool {
        self.transport.is_active(self.conn)
    }

    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.transport.deliver(self.conn, data)
    }
}
