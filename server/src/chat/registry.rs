//! Live chat sessions and message fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relaychat_protocol::MessageInfo;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Identifies one accepted connection. Unique for the process lifetime.
pub type ConnectionId = u64;

/// Encoded bytes queued for a session's writer task.
pub type Outbound = Arc<[u8]>;

/// Default bound of a chat session's outbound queue, in queued replies.
pub const DEFAULT_SESSION_QUEUE: usize = 256;

struct RegisteredSession {
    user_id: u32,
    outbound: Sender<Outbound>,
    /// Signalled when the session is evicted for not draining its queue.
    evicted: Arc<Notify>,
}

/// Authenticated sessions, keyed by connection. The same user may hold
/// several connections at once.
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<ConnectionId, RegisteredSession>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ConnectionId, RegisteredSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, conn: ConnectionId, user_id: u32, outbound: Sender<Outbound>, evicted: Arc<Notify>) {
        self.sessions().insert(conn, RegisteredSession { user_id, outbound, evicted });
    }

    /// Returns false if the connection was not registered.
    pub fn unregister(&self, conn: ConnectionId) -> bool {
        self.sessions().remove(&conn).is_some()
    }

    /// Drops every connection of one user. Returns how many were removed.
    pub fn unregister_user(&self, user_id: u32) -> usize {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        before - sessions.len()
    }

    #[must_use]
    pub fn is_online(&self, user_id: u32) -> bool {
        self.sessions().values().any(|s| s.user_id == user_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues the full `MESSAGE` sequence for every registered session, the
    /// sender included. The lock is held only while enqueueing; delivery is
    /// done by each session's writer. A session whose queue is full is
    /// removed and told to disconnect. Returns the number of sessions reached.
    pub fn broadcast(&self, message: &MessageInfo) -> usize {
        let bytes: Outbound = message.encode().into();
        let mut sessions = self.sessions();
        let mut delivered = 0;
        let mut stalled = Vec::new();
        for (&conn, session) in sessions.iter() {
            match session.outbound.try_send(Arc::clone(&bytes)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => stalled.push(conn),
                Err(TrySendError::Closed(_)) => debug!("Writer for connection {} already gone", conn),
            }
        }
        for conn in stalled {
            if let Some(session) = sessions.remove(&conn) {
                warn!("Evicting connection {} of user {}: outbound queue full", conn, session.user_id);
                session.evicted.notify_one();
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaychat_protocol::{Packet, PacketKind};
    use std::time::Duration;
    use tokio::sync::mpsc::{self, Receiver};

    fn session_with_queue(
        registry: &SessionRegistry,
        user_id: u32,
        queue: usize,
    ) -> (ConnectionId, Receiver<Outbound>, Arc<Notify>) {
        let (tx, rx) = mpsc::channel(queue);
        let evicted = Arc::new(Notify::new());
        let conn = registry.next_connection_id();
        registry.register(conn, user_id, tx, Arc::clone(&evicted));
        (conn, rx, evicted)
    }

    fn session(registry: &SessionRegistry, user_id: u32) -> (ConnectionId, Receiver<Outbound>) {
        let (conn, rx, _) = session_with_queue(registry, user_id, DEFAULT_SESSION_QUEUE);
        (conn, rx)
    }

    #[test]
    fn broadcast_reaches_every_registered_session() {
        let registry = SessionRegistry::new();
        let (_, mut a) = session(&registry, 1);
        let (_, mut b) = session(&registry, 2);
        let (_, mut c) = session(&registry, 3);
        let (_tx, mut outsider) = mpsc::channel::<Outbound>(1);

        let message = MessageInfo::new(1, 1_700_000_000, "hi all");
        assert_eq!(registry.broadcast(&message), 3);

        for rx in [&mut a, &mut b, &mut c] {
            let bytes = rx.try_recv().expect("queued message");
            let mut offset = 0;
            let mut packets = Vec::new();
            while offset < bytes.len() {
                let (packet, used) = Packet::decode(&bytes[offset..]).unwrap();
                packets.push(packet);
                offset += used;
            }
            assert_eq!(packets.len(), 4);
            assert_eq!(packets[0].kind, PacketKind::Message);
            assert_eq!(packets[1].as_uint(), Ok(1));
            assert_eq!(packets[2].as_uint(), Ok(1_700_000_000));
            assert_eq!(packets[3].clone().into_text().as_deref(), Ok("hi all"));
            assert!(rx.try_recv().is_err());
        }
        assert!(outsider.try_recv().is_err());
    }

    #[test]
    fn unregistered_session_stops_receiving() {
        let registry = SessionRegistry::new();
        let (conn, mut rx) = session(&registry, 5);
        assert!(registry.is_online(5));

        assert!(registry.unregister(conn));
        assert!(!registry.unregister(conn));
        assert!(!registry.is_online(5));

        assert_eq!(registry.broadcast(&MessageInfo::new(5, 0, "gone")), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn same_user_may_hold_two_connections() {
        let registry = SessionRegistry::new();
        let (first, _rx1) = session(&registry, 9);
        let (_, _rx2) = session(&registry, 9);
        assert_eq!(registry.len(), 2);

        registry.unregister(first);
        assert!(registry.is_online(9));

        assert_eq!(registry.unregister_user(9), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn closed_writer_is_skipped() {
        let registry = SessionRegistry::new();
        let (_, rx) = session(&registry, 1);
        let (_, mut live) = session(&registry, 2);
        drop(rx);

        assert_eq!(registry.broadcast(&MessageInfo::new(2, 0, "x")), 1);
        assert!(live.try_recv().is_ok());
    }

    #[tokio::test]
    async fn full_queue_evicts_only_that_session() {
        let registry = SessionRegistry::new();
        let (_, _stalled_rx, evicted) = session_with_queue(&registry, 1, 2);
        let (_, mut live, live_evicted) = session_with_queue(&registry, 2, 8);

        for i in 0..3 {
            registry.broadcast(&MessageInfo::new(2, i, "flood"));
            live.try_recv().expect("live session keeps up");
        }

        assert!(!registry.is_online(1));
        assert!(registry.is_online(2));
        tokio::time::timeout(Duration::from_secs(1), evicted.notified())
            .await
            .expect("stalled session told to disconnect");
        assert!(tokio::time::timeout(Duration::from_millis(20), live_evicted.notified())
            .await
            .is_err());
        assert_eq!(registry.broadcast(&MessageInfo::new(2, 9, "after")), 1);
    }
}
