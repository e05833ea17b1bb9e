//! Realtime side of consultations: presence, rooms and the socket protocol.

pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod presence;
pub mod rooms;
pub mod service;
pub mod store;

/// Identifies one socket connection for its lifetime.
pub type ConnId = uuid::Uuid;
