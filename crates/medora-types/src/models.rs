use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConsultError;

/// Which side of an appointment a participant is on.
///
/// Patient and doctor identifiers live in separate namespaces, so the role is
/// always carried next to an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConsultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            other => Err(ConsultError::InvalidMessage(format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Accepted => "accepted",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Lenient parse for values written by the scheduling service.
    pub fn parse(s: &str) -> Self {
        match s {
            "accepted" => AppointmentStatus::Accepted,
            "rejected" => AppointmentStatus::Rejected,
            "completed" => AppointmentStatus::Completed,
            "cancelled" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Pending,
        }
    }
}

/// What the consultation subsystem needs to know about an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub status: AppointmentStatus,
}

impl Appointment {
    /// The id a participant must carry to act as `role` on this appointment.
    pub fn party(&self, role: Role) -> &str {
        match role {
            Role::Patient => &self.patient_id,
            Role::Doctor => &self.doctor_id,
        }
    }

    pub fn admits(&self, participant_id: &str, role: Role) -> bool {
        self.party(role) == participant_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Document,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Document => "document",
        }
    }

    /// Pick the media kind for an uploaded file from its content type.
    pub fn for_content_type(content_type: &str) -> Self {
        if content_type.starts_with("image/") {
            MessageKind::Image
        } else {
            MessageKind::Document
        }
    }
}

impl FromStr for MessageKind {
    type Err = ConsultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "document" => Ok(MessageKind::Document),
            other => Err(ConsultError::InvalidMessage(format!("unknown message kind '{}'", other))),
        }
    }
}

/// Client-supplied message body, before the server assigns id and timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: Some(MessageKind::Text),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn media(kind: MessageKind, file_url: String, file_name: String, file_size: u64) -> Self {
        Self {
            kind: Some(kind),
            content: None,
            file_url: Some(file_url),
            file_name: Some(file_name),
            file_size: Some(file_size),
        }
    }

    /// Check the kind/content/file invariant. A missing kind means text.
    pub fn validate(&self) -> Result<MessageKind, ConsultError> {
        let kind = self.kind.unwrap_or(MessageKind::Text);
        match kind {
            MessageKind::Text => {
                let has_content = self
                    .content
                    .as_deref()
                    .is_some_and(|c| !c.trim().is_empty());
                if !has_content {
                    return Err(ConsultError::InvalidMessage(
                        "text message requires non-empty content".into(),
                    ));
                }
            }
            MessageKind::Image | MessageKind::Document => {
                let has_file = self
                    .file_url
                    .as_deref()
                    .is_some_and(|u| !u.trim().is_empty());
                if !has_file {
                    return Err(ConsultError::InvalidMessage(format!(
                        "{} message requires a file reference",
                        kind.as_str()
                    )));
                }
                if self.file_size.is_some_and(|size| size > i64::MAX as u64) {
                    return Err(ConsultError::InvalidMessage("fileSize out of range".into()));
                }
            }
        }
        Ok(kind)
    }
}

/// A persisted message. Immutable apart from its read flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub sender_role: Role,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

/// The persisted chat record for one appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationSession {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// Row of the "active consultations" listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub unread_count: u64,
}
