use std::collections::HashMap;

use medora_types::models::Role;

use crate::ConnId;

/// Presence key. Role is part of the key because patient and doctor ids are
/// separate namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantKey {
    pub participant_id: String,
    pub role: Role,
}

impl ParticipantKey {
    pub fn new(participant_id: impl Into<String>, role: Role) -> Self {
        Self {
            participant_id: participant_id.into(),
            role,
        }
    }
}

/// Best-effort liveness cache: participant -> owning connection.
/// Never consulted for authorization.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: HashMap<ParticipantKey, ConnId>,
}

impl PresenceRegistry {
    /// Record `conn_id` as the live connection. Returns the connection it replaced.
    pub fn mark_online(&mut self, key: ParticipantKey, conn_id: ConnId) -> Option<ConnId> {
        self.entries.insert(key, conn_id).filter(|prev| *prev != conn_id)
    }

    /// Remove the entry, but only if `conn_id` still owns it.
    pub fn mark_offline(&mut self, key: &ParticipantKey, conn_id: ConnId) -> bool {
        if self.entries.get(key) == Some(&conn_id) {
            self.entries.remove(key);
            true
        } else {
            false
        }
    }

    pub fn connection_of(&self, key: &ParticipantKey) -> Option<ConnId> {
        self.entries.get(key).copied()
    }

    pub fn is_online(&self, key: &ParticipantKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn reconnect_overwrites_entry() {
        let mut presence = PresenceRegistry::default();
        let key = ParticipantKey::new("P", Role::Patient);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert_eq!(presence.mark_online(key.clone(), first), None);
        assert_eq!(presence.mark_online(key.clone(), second), Some(first));
        assert_eq!(presence.connection_of(&key), Some(second));
        assert_eq!(presence.len(), 1);

        // stale connection going away must not evict the newer one
        assert!(!presence.mark_offline(&key, first));
        assert!(presence.is_online(&key));

        assert!(presence.mark_offline(&key, second));
        assert!(presence.is_empty());
    }

    #[test]
    fn roles_do_not_collide() {
        let mut presence = PresenceRegistry::default();
        let conn = Uuid::new_v4();
        presence.mark_online(ParticipantKey::new("42", Role::Patient), conn);

        assert!(!presence.is_online(&ParticipantKey::new("42", Role::Doctor)));
        assert!(presence.is_online(&ParticipantKey::new("42", Role::Patient)));
    }
}
