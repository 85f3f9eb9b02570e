//! Connection handles and the table of live sessions.
//!
//! Delivery never blocks: each session owns the sending half of an unbounded
//! outbox whose receiver is drained by the transport writer.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::trace;

/// Sending half of a connection's outbound frame queue.
pub type Outbox = mpsc::UnboundedSender<Bytes>;

/// Receiving half of a connection's outbound frame queue.
pub type OutboxReceiver = mpsc::UnboundedReceiver<Bytes>;

/// Create a new outbox pair.
#[must_use]
pub fn outbox() -> (Outbox, OutboxReceiver) {
    mpsc::unbounded_channel()
}

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for one transport session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}", n))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle of a connection.
///
/// `Connecting → Authenticated → Active → Closed`. A failed handshake goes
/// straight from `Connecting` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Active,
    Closed,
}

/// A live session known to the relay.
#[derive(Debug)]
pub struct Session {
    user_id: String,
    state: ConnectionState,
    outbox: Outbox,
}

impl Session {
    /// Create a session in the `Connecting` state.
    #[must_use]
    pub fn new(user_id: impl Into<String>, outbox: Outbox) -> Self {
        Self {
            user_id: user_id.into(),
            state: ConnectionState::Connecting,
            outbox,
        }
    }

    /// Identity that owns this session.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to a later lifecycle state.
    pub fn advance(&mut self, next: ConnectionState) {
        debug_assert!(next > self.state, "lifecycle only moves forward");
        self.state = next;
    }

    /// Check if the session accepts events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    /// Queue an encoded frame. Returns `false` if the transport is gone.
    pub fn send(&self, frame: &Bytes) -> bool {
        self.outbox.send(frame.clone()).is_ok()
    }
}

/// All sessions the relay currently tracks, keyed by connection.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ConnectionId, session: Session) -> Option<Session> {
        self.sessions.insert(id, session)
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<Session> {
        self.sessions.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Get an active session, ignoring ones still in the handshake.
    #[must_use]
    pub fn active(&self, id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(id).filter(|s| s.is_active())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Send a frame to one connection.
    pub fn send_to(&self, id: &ConnectionId, frame: &Bytes) -> bool {
        self.active(id).is_some_and(|s| s.send(frame))
    }

    /// Send a frame to each listed connection that is active.
    ///
    /// Returns the number of connections that accepted the frame.
    pub fn deliver<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a ConnectionId>,
        frame: &Bytes,
    ) -> usize {
        targets
            .into_iter()
            .filter(|id| self.send_to(id, frame))
            .count()
    }

    /// Send a frame to every active connection.
    pub fn broadcast(&self, frame: &Bytes) -> usize {
        let count = self
            .sessions
            .values()
            .filter(|s| s.is_active() && s.send(frame))
            .count();
        trace!(recipients = count, "Broadcast frame");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_session_lifecycle() {
        let (tx, _rx) = outbox();
        let mut session = Session::new("u1", tx);
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(!session.is_active());

        session.advance(ConnectionState::Authenticated);
        session.advance(ConnectionState::Active);
        assert!(session.is_active());
    }

    #[test]
    fn test_deliver_skips_inactive_and_closed() {
        let mut table = SessionTable::new();

        let (tx_a, mut rx_a) = outbox();
        let mut a = Session::new("a", tx_a);
        a.advance(ConnectionState::Active);
        table.insert("a".into(), a);

        let (tx_b, mut rx_b) = outbox();
        table.insert("b".into(), Session::new("b", tx_b));

        let (tx_c, rx_c) = outbox();
        let mut c = Session::new("c", tx_c);
        c.advance(ConnectionState::Active);
        table.insert("c".into(), c);
        drop(rx_c);

        let frame = Bytes::from_static(b"{}");
        let targets: Vec<ConnectionId> = vec!["a".into(), "b".into(), "c".into(), "zz".into()];
        assert_eq!(table.deliver(&targets, &frame), 1);
        assert_eq!(table.broadcast(&frame), 1);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
