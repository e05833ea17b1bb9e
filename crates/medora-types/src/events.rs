use serde::{Deserialize, Serialize};

use crate::models::{Message, MessagePayload, Role};

/// Events sent from the server to a socket client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Confirms a presence announcement
    PresenceAck { participant_id: String, role: Role },

    /// Sent only to the joining connection
    RoomJoined {
        appointment_id: String,
        history: Vec<Message>,
        is_active: bool,
    },

    /// Another participant joined the room
    PeerJoined {
        appointment_id: String,
        role: Role,
        participant_id: String,
    },

    /// A persisted message, echoed to the whole room including the sender
    MessageBroadcast {
        appointment_id: String,
        message: Message,
    },

    TypingChanged {
        appointment_id: String,
        participant_id: String,
        role: Role,
        is_typing: bool,
    },

    /// The reader marked messages as read; clients should refetch
    ReadStateChanged {
        appointment_id: String,
        reader_id: String,
    },

    PeerLeft {
        appointment_id: String,
        role: Role,
        participant_id: String,
    },

    SessionEnded { appointment_id: String },

    /// Returned only to the connection whose command failed
    OperationError { reason: String, message: String },
}

/// Commands sent FROM client TO server over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    PresenceAnnounce { participant_id: String, role: Role },

    JoinRoom {
        appointment_id: String,
        participant_id: String,
        role: Role,
    },

    SendMessage {
        appointment_id: String,
        sender_id: String,
        role: Role,
        payload: MessagePayload,
    },

    Typing {
        appointment_id: String,
        participant_id: String,
        role: Role,
    },

    StopTyping {
        appointment_id: String,
        participant_id: String,
        role: Role,
    },

    MarkRead {
        appointment_id: String,
        reader_id: String,
    },

    LeaveRoom {
        appointment_id: String,
        participant_id: String,
        role: Role,
    },

    EndSession { appointment_id: String },
}

impl ClientCommand {
    /// Event name as it appears on the wire, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PresenceAnnounce { .. } => "presence-announce",
            Self::JoinRoom { .. } => "join-room",
            Self::SendMessage { .. } => "send-message",
            Self::Typing { .. } => "typing",
            Self::StopTyping { .. } => "stop-typing",
            Self::MarkRead { .. } => "mark-read",
            Self::LeaveRoom { .. } => "leave-room",
            Self::EndSession { .. } => "end-session",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageKind;

    #[test]
    fn join_room_wire_format() {
        let raw = r#"{"type":"join-room","data":{"appointmentId":"A123","participantId":"P","role":"patient"}}"#;
        let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::JoinRoom {
                appointment_id: "A123".into(),
                participant_id: "P".into(),
                role: Role::Patient,
            }
        );
    }

    #[test]
    fn send_message_payload_decodes() {
        let raw = r#"{"type":"send-message","data":{"appointmentId":"A1","senderId":"D","role":"doctor","payload":{"kind":"image","fileUrl":"/files/x","fileName":"x.png","fileSize":10}}}"#;
        let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            ClientCommand::SendMessage { payload, role, .. } => {
                assert_eq!(role, Role::Doctor);
                assert_eq!(payload.kind, Some(MessageKind::Image));
                assert_eq!(payload.file_size, Some(10));
                assert!(payload.content.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn server_event_tags() {
        let event = ServerEvent::SessionEnded {
            appointment_id: "A123".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session-ended");
        assert_eq!(json["data"]["appointmentId"], "A123");

        let typing = ServerEvent::TypingChanged {
            appointment_id: "A123".into(),
            participant_id: "P".into(),
            role: Role::Patient,
            is_typing: true,
        };
        let json = serde_json::to_value(&typing).unwrap();
        assert_eq!(json["type"], "typing-changed");
        assert_eq!(json["data"]["isTyping"], true);
    }

    #[test]
    fn unknown_command_is_rejected() {
        let raw = r#"{"type":"delete-history","data":{"appointmentId":"A1"}}"#;
        assert!(serde_json::from_str::<ClientCommand>(raw).is_err());
    }
}
