use std::collections::HashMap;

use medora_types::models::Role;

use crate::ConnId;

/// Who a connection joined a room as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMember {
    pub participant_id: String,
    pub role: Role,
}

/// In-memory broadcast groups keyed by appointment id.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<String, HashMap<ConnId, RoomMember>>,
}

impl RoomTable {
    /// Add a connection to a room. Returns false if it was already a member.
    pub fn join(&mut self, appointment_id: &str, conn_id: ConnId, member: RoomMember) -> bool {
        self.rooms
            .entry(appointment_id.to_string())
            .or_default()
            .insert(conn_id, member)
            .is_none()
    }

    /// Remove a connection from a room; empty rooms are dropped.
    pub fn leave(&mut self, appointment_id: &str, conn_id: ConnId) -> Option<RoomMember> {
        let room = self.rooms.get_mut(appointment_id)?;
        let member = room.remove(&conn_id);
        if room.is_empty() {
            self.rooms.remove(appointment_id);
        }
        member
    }

    pub fn member(&self, appointment_id: &str, conn_id: ConnId) -> Option<&RoomMember> {
        self.rooms.get(appointment_id)?.get(&conn_id)
    }

    pub fn connections(&self, appointment_id: &str) -> Vec<ConnId> {
        self.rooms
            .get(appointment_id)
            .map(|room| room.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Drop a connection from every room it is in. Returns (appointment_id, member) pairs.
    pub fn remove_connection(&mut self, conn_id: ConnId) -> Vec<(String, RoomMember)> {
        let mut left = Vec::new();
        self.rooms.retain(|appointment_id, room| {
            if let Some(member) = room.remove(&conn_id) {
                left.push((appointment_id.clone(), member));
            }
            !room.is_empty()
        });
        left
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn member(id: &str, role: Role) -> RoomMember {
        RoomMember {
            participant_id: id.into(),
            role,
        }
    }

    #[test]
    fn join_and_leave() {
        let mut rooms = RoomTable::default();
        let p = Uuid::new_v4();
        let d = Uuid::new_v4();

        assert!(rooms.join("A123", p, member("P", Role::Patient)));
        assert!(!rooms.join("A123", p, member("P", Role::Patient)));
        assert!(rooms.join("A123", d, member("D", Role::Doctor)));
        assert_eq!(rooms.connections("A123").len(), 2);

        assert_eq!(rooms.leave("A123", p), Some(member("P", Role::Patient)));
        assert_eq!(rooms.leave("A123", p), None);
        assert_eq!(rooms.leave("other", p), None);

        assert_eq!(rooms.leave("A123", d).map(|m| m.role), Some(Role::Doctor));
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn remove_connection_from_all_rooms() {
        let mut rooms = RoomTable::default();
        let conn = Uuid::new_v4();
        let other = Uuid::new_v4();
        rooms.join("A1", conn, member("D", Role::Doctor));
        rooms.join("A2", conn, member("D", Role::Doctor));
        rooms.join("A2", other, member("P", Role::Patient));

        let mut left = rooms.remove_connection(conn);
        left.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(left.len(), 2);
        assert_eq!(left[0].0, "A1");
        assert_eq!(left[1].0, "A2");

        assert_eq!(rooms.room_count(), 1);
        assert_eq!(rooms.connections("A2"), vec![other]);
        assert!(rooms.member("A2", conn).is_none());
    }
}
