/// Delivery router and upstream facade of the real-time hub.
///
/// One `RealtimeHub` is constructed at startup and shared by reference with
/// every call site: connection sessions, HTTP handlers, and the notification
/// emitter. Delivery is best-effort and at-most-once per connection; a failed
/// write removes that connection on the spot and is never retried or
/// surfaced to the caller. Callers that care about reach read the returned
/// delivered count.
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::messages::{PresenceStatus, ServerEnvelope};
use super::registry::{ConnectionHandle, ConnectionRegistry, PresenceChange};
use super::rooms::RoomRegistry;

#[derive(Debug, Default)]
pub struct RealtimeHub {
    registry: ConnectionRegistry,
    rooms: RoomRegistry,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // ---- connection lifecycle ----

    /// Register a connection. On the user's first connection, announces
    /// `user_status = online` to every other connected user. Never waits on
    /// delivery.
    pub fn admit(&self, user_id: Uuid, handle: ConnectionHandle) {
        if self.registry.admit(user_id, handle) == PresenceChange::CameOnline {
            info!(%user_id, "user online");
            self.broadcast(
                &ServerEnvelope::user_status(user_id, PresenceStatus::Online),
                Some(user_id),
            );
        }
    }

    /// Unregister one connection; idempotent. When the user's last
    /// connection goes, announces `user_status = offline` exactly once.
    /// Room membership is untouched.
    pub fn remove(&self, user_id: Uuid, connection_id: Uuid) {
        if self.registry.remove(user_id, connection_id) == PresenceChange::WentOffline {
            info!(%user_id, "user offline");
            self.broadcast(
                &ServerEnvelope::user_status(user_id, PresenceStatus::Offline),
                Some(user_id),
            );
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.registry.is_online(user_id)
    }

    pub fn list_online(&self) -> Vec<Uuid> {
        self.registry.list_online()
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.registry.connection_count(user_id)
    }

    pub fn total_connections(&self) -> usize {
        self.registry.total_connections()
    }

    pub fn connected_users_count(&self) -> usize {
        self.registry.connected_users_count()
    }

    // ---- room membership ----

    /// Idempotent join; announces `user_joined` to the room's other members
    /// only when membership actually changed.
    pub fn join_room(&self, user_id: Uuid, room_id: Uuid) {
        if self.rooms.join(user_id, room_id) {
            self.send_to_room(
                room_id,
                &ServerEnvelope::user_joined(room_id, user_id),
                Some(user_id),
            );
        }
    }

    /// Removes the user and announces `user_left` to the remaining members
    pub fn leave_room(&self, user_id: Uuid, room_id: Uuid) {
        if self.rooms.leave(user_id, room_id) {
            self.send_to_room(room_id, &ServerEnvelope::user_left(room_id, user_id), None);
        }
    }

    pub fn room_members(&self, room_id: Uuid) -> Vec<Uuid> {
        self.rooms.members(room_id)
    }

    // ---- delivery ----

    /// Write the envelope to every connection of one user. Returns how many
    /// connections accepted it. A connection that refuses the write is
    /// removed immediately; the user's other connections are unaffected.
    pub fn send_to_user(&self, user_id: Uuid, envelope: &ServerEnvelope) -> usize {
        let (delivered, failed) = self.registry.deliver(user_id, envelope);
        for connection_id in failed {
            warn!(%user_id, %connection_id, "unresponsive connection, removing");
            self.remove(user_id, connection_id);
        }
        delivered
    }

    /// Deliver to a snapshot of the room's members, optionally excluding one
    /// (typically the sender). One member's failure never affects the rest.
    pub fn send_to_room(
        &self,
        room_id: Uuid,
        envelope: &ServerEnvelope,
        exclude_user: Option<Uuid>,
    ) -> usize {
        let mut delivered = 0;
        for member in self.rooms.members(room_id) {
            if Some(member) == exclude_user {
                continue;
            }
            delivered += self.send_to_user(member, envelope);
        }
        delivered
    }

    /// Deliver to an explicit recipient list supplied by the business layer
    /// (e.g. a ticket's owner, assignee, and watchers)
    pub fn send_to_users(&self, user_ids: &[Uuid], envelope: &ServerEnvelope) -> usize {
        user_ids
            .iter()
            .map(|user_id| self.send_to_user(*user_id, envelope))
            .sum()
    }

    /// Deliver to every connected user, optionally excluding one
    pub fn broadcast(&self, envelope: &ServerEnvelope, exclude_user: Option<Uuid>) -> usize {
        let mut delivered = 0;
        for user_id in self.registry.list_online() {
            if Some(user_id) == exclude_user {
                continue;
            }
            delivered += self.send_to_user(user_id, envelope);
        }
        delivered
    }

    /// Typing indicator fan-out, sender excluded
    pub fn send_typing(&self, room_id: Uuid, user_id: Uuid, is_typing: bool) -> usize {
        self.send_to_room(
            room_id,
            &ServerEnvelope::typing(room_id, user_id, is_typing),
            Some(user_id),
        )
    }
}
