//! Database row types. These map directly to SQLite rows; timestamps are
//! Unix milliseconds. Conversions into `medora-types` models live here so the
//! callers never touch raw columns.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use medora_types::models::{
    Appointment, AppointmentStatus, ConsultationSession, Message, SessionSummary,
};
use uuid::Uuid;

pub struct AppointmentRow {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub status: String,
}

pub struct ConsultationRow {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub is_active: bool,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub last_activity: i64,
    pub created_at: i64,
}

pub struct MessageRow {
    pub id: String,
    pub appointment_id: String,
    pub sender_id: String,
    pub sender_role: String,
    pub kind: String,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: i64,
    pub read: bool,
    pub read_at: Option<i64>,
}

/// Insert parameters for a message. Id and timestamp are assigned by the
/// store inside the append transaction.
pub struct NewMessage {
    pub sender_id: String,
    pub sender_role: String,
    pub kind: String,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

pub struct SummaryRow {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub is_active: bool,
    pub started_at: i64,
    pub last_activity: i64,
    pub unread_count: i64,
}

pub struct FileRow {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
    pub created_at: i64,
}

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {}", ms))
}

impl AppointmentRow {
    pub fn into_appointment(self) -> Appointment {
        Appointment {
            status: AppointmentStatus::parse(&self.status),
            id: self.id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
        }
    }
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| anyhow!("corrupt message id '{}': {}", self.id, e))?,
            sender_id: self.sender_id,
            sender_role: self
                .sender_role
                .parse()
                .map_err(|e| anyhow!("corrupt sender_role on message {}: {}", self.id, e))?,
            kind: self
                .kind
                .parse()
                .map_err(|e| anyhow!("corrupt kind on message {}: {}", self.id, e))?,
            content: self.content,
            file_url: self.file_url,
            file_name: self.file_name,
            file_size: self
                .file_size
                .map(u64::try_from)
                .transpose()
                .map_err(|e| anyhow!("corrupt file_size on message {}: {}", self.id, e))?,
            timestamp: from_millis(self.created_at)?,
            read: self.read,
            read_at: self.read_at.map(from_millis).transpose()?,
        })
    }
}

impl ConsultationRow {
    pub fn into_session(self, messages: Vec<MessageRow>) -> Result<ConsultationSession> {
        let messages = messages
            .into_iter()
            .map(MessageRow::into_message)
            .collect::<Result<Vec<_>>>()?;

        Ok(ConsultationSession {
            appointment_id: self.appointment_id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            is_active: self.is_active,
            started_at: from_millis(self.started_at)?,
            ended_at: self.ended_at.map(from_millis).transpose()?,
            last_activity: from_millis(self.last_activity)?,
            created_at: from_millis(self.created_at)?,
            messages,
        })
    }
}

impl SummaryRow {
    pub fn into_summary(self) -> Result<SessionSummary> {
        Ok(SessionSummary {
            appointment_id: self.appointment_id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            is_active: self.is_active,
            started_at: from_millis(self.started_at)?,
            last_activity: from_millis(self.last_activity)?,
            unread_count: self.unread_count.max(0) as u64,
        })
    }
}
