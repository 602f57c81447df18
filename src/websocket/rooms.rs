/// Room membership table.
///
/// Membership is independent of connection state: joining and leaving happen
/// only through explicit calls, never as a side effect of connect or
/// disconnect. A member who is offline simply receives nothing.
use dashmap::{DashMap, DashSet};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<Uuid, DashSet<Uuid>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent add. Returns whether the user was newly added.
    pub fn join(&self, user_id: Uuid, room_id: Uuid) -> bool {
        let members = self.rooms.entry(room_id).or_default();
        let added = members.insert(user_id);
        if added {
            debug!(%user_id, %room_id, members = members.len(), "user joined room");
        }
        added
    }

    /// Returns whether the user was a member. Empty rooms are pruned.
    pub fn leave(&self, user_id: Uuid, room_id: Uuid) -> bool {
        let removed = {
            let Some(members) = self.rooms.get(&room_id) else {
                return false;
            };
            members.remove(&user_id).is_some()
        };

        if removed {
            self.rooms.remove_if(&room_id, |_, members| members.is_empty());
            debug!(%user_id, %room_id, "user left room");
        }
        removed
    }

    /// Point-in-time snapshot of a room's members. Callers iterate the
    /// snapshot, never the live set.
    pub fn members(&self, room_id: Uuid) -> Vec<Uuid> {
        self.rooms
            .get(&room_id)
            .map(|members| members.iter().map(|user| *user).collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, user_id: Uuid, room_id: Uuid) -> bool {
        self.rooms
            .get(&room_id)
            .map(|members| members.contains(&user_id))
            .unwrap_or(false)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_is_idempotent() {
        let rooms = RoomRegistry::new();
        let user_id = Uuid::new_v4();
        let room_id = Uuid::new_v4();

        assert!(rooms.join(user_id, room_id));
        assert!(!rooms.join(user_id, room_id));
        assert_eq!(rooms.members(room_id), vec![user_id]);
    }

    #[test]
    fn test_leave_prunes_empty_rooms() {
        let rooms = RoomRegistry::new();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let room_id = Uuid::new_v4();

        rooms.join(user_a, room_id);
        rooms.join(user_b, room_id);
        assert_eq!(rooms.room_count(), 1);

        assert!(rooms.leave(user_a, room_id));
        assert_eq!(rooms.room_count(), 1);
        assert!(rooms.leave(user_b, room_id));
        assert_eq!(rooms.room_count(), 0);

        // Leaving a pruned room is a no-op
        assert!(!rooms.leave(user_b, room_id));
    }

    #[test]
    fn test_members_is_a_snapshot() {
        let rooms = RoomRegistry::new();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let room_id = Uuid::new_v4();

        rooms.join(user_a, room_id);
        let snapshot = rooms.members(room_id);

        rooms.join(user_b, room_id);
        assert_eq!(snapshot, vec![user_a]);
        assert_eq!(rooms.members(room_id).len(), 2);
    }

    #[test]
    fn test_is_member() {
        let rooms = RoomRegistry::new();
        let user_id = Uuid::new_v4();
        let room_id = Uuid::new_v4();

        assert!(!rooms.is_member(user_id, room_id));
        rooms.join(user_id, room_id);
        assert!(rooms.is_member(user_id, room_id));
    }
}
