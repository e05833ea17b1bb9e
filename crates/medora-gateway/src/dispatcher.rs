use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use medora_types::events::ServerEvent;

use crate::ConnId;
use crate::presence::{ParticipantKey, PresenceRegistry};
use crate::rooms::{RoomMember, RoomTable};

struct Connection {
    sender: mpsc::UnboundedSender<ServerEvent>,
    /// Bound from the upgrade token; the connection may only act as this participant.
    identity: Option<ParticipantKey>,
}

/// The realtime gateway: owns every live connection, the presence registry
/// and room membership. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// conn_id -> outbound channel of that socket
    connections: RwLock<HashMap<ConnId, Connection>>,

    presence: RwLock<PresenceRegistry>,

    /// appointment_id -> joined connections
    rooms: RwLock<RoomTable>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                connections: RwLock::new(HashMap::new()),
                presence: RwLock::new(PresenceRegistry::default()),
                rooms: RwLock::new(RoomTable::default()),
            }),
        }
    }

    /// Register a new connection. Returns (conn_id, receiver of its events).
    pub async fn register_connection(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (sender, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(
            conn_id,
            Connection {
                sender,
                identity: None,
            },
        );
        (conn_id, rx)
    }

    /// Tear down a connection: leave every room (notifying the remaining
    /// members), clear presence if this connection still owns it.
    pub async fn disconnect(&self, conn_id: ConnId) -> Vec<(String, RoomMember)> {
        // Unregister first so a concurrent join_room cannot re-add the connection
        let identity = self
            .inner
            .connections
            .write()
            .await
            .remove(&conn_id)
            .and_then(|conn| conn.identity);

        let left = self.inner.rooms.write().await.remove_connection(conn_id);

        if let Some(key) = identity {
            if self.inner.presence.write().await.mark_offline(&key, conn_id) {
                info!("{} {} went offline", key.role, key.participant_id);
            }
        }

        for (appointment_id, member) in &left {
            self.broadcast_to_room(
                appointment_id,
                ServerEvent::PeerLeft {
                    appointment_id: appointment_id.clone(),
                    role: member.role,
                    participant_id: member.participant_id.clone(),
                },
            )
            .await;
        }

        left
    }

    // -- Presence --

    /// Bind an identity to a connection and mark it online. Returns false if
    /// the connection already announced a different identity.
    pub async fn announce(&self, conn_id: ConnId, key: ParticipantKey) -> bool {
        {
            let mut connections = self.inner.connections.write().await;
            let Some(conn) = connections.get_mut(&conn_id) else {
                return false;
            };
            if conn.identity.as_ref().is_some_and(|existing| *existing != key) {
                return false;
            }
            conn.identity = Some(key.clone());
        }

        let replaced = self.inner.presence.write().await.mark_online(key.clone(), conn_id);
        if let Some(previous) = replaced {
            debug!(
                "{} {} reconnected, replacing connection {}",
                key.role, key.participant_id, previous
            );
        }
        info!("{} {} is online", key.role, key.participant_id);
        true
    }

    pub async fn identity_of(&self, conn_id: ConnId) -> Option<ParticipantKey> {
        self.inner
            .connections
            .read()
            .await
            .get(&conn_id)
            .and_then(|conn| conn.identity.clone())
    }

    pub async fn is_online(&self, key: &ParticipantKey) -> bool {
        self.inner.presence.read().await.is_online(key)
    }

    pub async fn online_count(&self) -> usize {
        self.inner.presence.read().await.len()
    }

    // -- Rooms --

    /// Returns `Some(false)` if the connection was already in the room and
    /// `None` if it has disconnected.
    pub async fn join_room(
        &self,
        appointment_id: &str,
        conn_id: ConnId,
        member: RoomMember,
    ) -> Option<bool> {
        let connections = self.inner.connections.read().await;
        if !connections.contains_key(&conn_id) {
            return None;
        }
        Some(self.inner.rooms.write().await.join(appointment_id, conn_id, member))
    }

    pub async fn leave_room(&self, appointment_id: &str, conn_id: ConnId) -> Option<RoomMember> {
        self.inner.rooms.write().await.leave(appointment_id, conn_id)
    }

    pub async fn room_member(&self, appointment_id: &str, conn_id: ConnId) -> Option<RoomMember> {
        self.inner
            .rooms
            .read()
            .await
            .member(appointment_id, conn_id)
            .cloned()
    }

    pub async fn room_size(&self, appointment_id: &str) -> usize {
        self.inner.rooms.read().await.connections(appointment_id).len()
    }

    // -- Delivery --

    /// Send an event to one connection. Dropped if the connection is gone.
    pub async fn send_to(&self, conn_id: ConnId, event: ServerEvent) {
        let connections = self.inner.connections.read().await;
        if let Some(conn) = connections.get(&conn_id) {
            let _ = conn.sender.send(event);
        }
    }

    /// Deliver to every connection in the room.
    pub async fn broadcast_to_room(&self, appointment_id: &str, event: ServerEvent) -> usize {
        self.fan_out(appointment_id, None, event).await
    }

    /// Deliver to every connection in the room except `exclude`.
    pub async fn broadcast_to_room_except(
        &self,
        appointment_id: &str,
        exclude: ConnId,
        event: ServerEvent,
    ) -> usize {
        self.fan_out(appointment_id, Some(exclude), event).await
    }

    async fn fan_out(&self, appointment_id: &str, exclude: Option<ConnId>, event: ServerEvent) -> usize {
        let targets = self.inner.rooms.read().await.connections(appointment_id);
        let connections = self.inner.connections.read().await;

        let mut delivered = 0;
        for conn_id in targets {
            if Some(conn_id) == exclude {
                continue;
            }
            if let Some(conn) = connections.get(&conn_id) {
                if conn.sender.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }
}
