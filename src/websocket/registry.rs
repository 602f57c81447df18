/// Connection registry and presence tracking.
///
/// Maps each user to their live connections. A user may hold several
/// connections at once; "online" means at least one. Entries are sharded per
/// user via DashMap, so lifecycle events and delivery lookups for different
/// users never serialize against each other, and no lock is ever held across
/// I/O (the only write done under an entry guard is a channel `try_send`).
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::messages::ServerEnvelope;

/// Per-connection outbound buffer. A connection whose buffer is full is
/// treated as unresponsive and removed.
pub const CONNECTION_BUFFER: usize = 64;

/// Presence transition reported by `admit`/`remove`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    /// First connection for the user
    CameOnline,
    /// Last connection for the user closed
    WentOffline,
    /// The user was already online / still is, or the call was a no-op
    Unchanged,
}

/// Write half of one live connection, owned by the registry for its lifetime
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    sender: mpsc::Sender<ServerEnvelope>,
    connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    /// Create a handle plus the receive half the transport task drains
    pub fn new() -> (Self, mpsc::Receiver<ServerEnvelope>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        let handle = Self {
            id: Uuid::new_v4(),
            sender: tx,
            connected_at: Utc::now(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Non-blocking write. `false` means the receiver is gone or its buffer
    /// is full; either way the connection is considered failed.
    fn try_send(&self, envelope: ServerEnvelope) -> bool {
        self.sender.try_send(envelope).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Vec<ConnectionHandle>>,
    presence: DashMap<Uuid, DateTime<Utc>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user
    pub fn admit(&self, user_id: Uuid, handle: ConnectionHandle) -> PresenceChange {
        let first = {
            let mut entry = self.connections.entry(user_id).or_default();
            let first = entry.is_empty();
            entry.push(handle);
            first
        };

        self.presence.insert(user_id, Utc::now());
        debug!(%user_id, connected_users = self.connections.len(), "connection admitted");

        if first {
            PresenceChange::CameOnline
        } else {
            PresenceChange::Unchanged
        }
    }

    /// Unregister one connection. Idempotent: removing an already-removed
    /// connection is a no-op, and in a double-disconnect race at most one
    /// caller sees `WentOffline`.
    pub fn remove(&self, user_id: Uuid, connection_id: Uuid) -> PresenceChange {
        let went_offline = {
            let Some(mut entry) = self.connections.get_mut(&user_id) else {
                return PresenceChange::Unchanged;
            };
            let before = entry.len();
            entry.retain(|handle| handle.id() != connection_id);
            if entry.len() == before {
                return PresenceChange::Unchanged;
            }
            entry.is_empty()
        };

        if !went_offline {
            return PresenceChange::Unchanged;
        }

        self.connections.remove_if(&user_id, |_, handles| handles.is_empty());
        self.presence.remove(&user_id);
        debug!(%user_id, "last connection removed, user offline");
        PresenceChange::WentOffline
    }

    /// Attempt a non-blocking write to every connection of a user.
    ///
    /// Returns the delivered count and the ids of connections whose write
    /// failed; the caller removes those (removal needs the entry guard this
    /// method already dropped).
    pub fn deliver(&self, user_id: Uuid, envelope: &ServerEnvelope) -> (usize, Vec<Uuid>) {
        let Some(handles) = self.connections.get(&user_id) else {
            return (0, Vec::new());
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for handle in handles.iter() {
            if handle.try_send(envelope.clone()) {
                delivered += 1;
            } else {
                failed.push(handle.id());
            }
        }
        (delivered, failed)
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.connections.contains_key(&user_id)
    }

    /// Snapshot of every user with at least one live connection
    pub fn list_online(&self) -> Vec<Uuid> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.connections
            .get(&user_id)
            .map(|handles| handles.len())
            .unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.connections.iter().map(|entry| entry.len()).sum()
    }

    pub fn connected_users_count(&self) -> usize {
        self.connections.len()
    }

    /// Last admission time, present iff the user is online
    pub fn last_seen(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.presence.get(&user_id).map(|entry| *entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admit_remove_presence_transitions() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let (handle_a, _rx_a) = ConnectionHandle::new();
        let (handle_b, _rx_b) = ConnectionHandle::new();
        let id_a = handle_a.id();
        let id_b = handle_b.id();

        assert!(!registry.is_online(user_id));
        assert_eq!(registry.admit(user_id, handle_a), PresenceChange::CameOnline);
        assert_eq!(registry.admit(user_id, handle_b), PresenceChange::Unchanged);
        assert!(registry.is_online(user_id));
        assert_eq!(registry.connection_count(user_id), 2);
        assert!(registry.last_seen(user_id).is_some());

        assert_eq!(registry.remove(user_id, id_a), PresenceChange::Unchanged);
        assert!(registry.is_online(user_id));
        assert_eq!(registry.remove(user_id, id_b), PresenceChange::WentOffline);
        assert!(!registry.is_online(user_id));
        assert!(registry.last_seen(user_id).is_none());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let (handle, _rx) = ConnectionHandle::new();
        let connection_id = handle.id();
        registry.admit(user_id, handle);

        assert_eq!(
            registry.remove(user_id, connection_id),
            PresenceChange::WentOffline
        );
        // Double-disconnect race: second removal reports nothing
        assert_eq!(
            registry.remove(user_id, connection_id),
            PresenceChange::Unchanged
        );
        assert_eq!(
            registry.remove(Uuid::new_v4(), connection_id),
            PresenceChange::Unchanged
        );
    }

    #[tokio::test]
    async fn test_list_online_matches_admitted_set() {
        let registry = ConnectionRegistry::new();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        let (handle_a, _rx_a) = ConnectionHandle::new();
        let (handle_b, _rx_b) = ConnectionHandle::new();
        let id_b = handle_b.id();

        registry.admit(user_a, handle_a);
        registry.admit(user_b, handle_b);

        let online = registry.list_online();
        assert_eq!(online.len(), 2);
        assert!(online.contains(&user_a));
        assert!(online.contains(&user_b));

        registry.remove(user_b, id_b);
        assert_eq!(registry.list_online(), vec![user_a]);
        assert_eq!(registry.total_connections(), 1);
        assert_eq!(registry.connected_users_count(), 1);
    }

    #[tokio::test]
    async fn test_deliver_reports_closed_connections() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let (alive, mut rx) = ConnectionHandle::new();
        let (dead, dead_rx) = ConnectionHandle::new();
        let dead_id = dead.id();
        registry.admit(user_id, alive);
        registry.admit(user_id, dead);
        drop(dead_rx);

        let (delivered, failed) = registry.deliver(user_id, &ServerEnvelope::pong());
        assert_eq!(delivered, 1);
        assert_eq!(failed, vec![dead_id]);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_deliver_to_offline_user_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        let (delivered, failed) = registry.deliver(Uuid::new_v4(), &ServerEnvelope::pong());
        assert_eq!(delivered, 0);
        assert!(failed.is_empty());
    }
}
