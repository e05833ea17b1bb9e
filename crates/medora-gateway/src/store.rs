//! Persistence seams used by the coordinator and relay, and their SQLite
//! implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::error;

use medora_db::models::{NewMessage, to_millis};
use medora_db::{AppendOutcome, Database, SessionOpen};
use medora_types::error::ConsultError;
use medora_types::models::{
    Appointment, ConsultationSession, Message, MessageKind, Role, SessionSummary,
};

/// Session fields needed to authorize an operation, without the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMeta {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub is_active: bool,
}

impl SessionMeta {
    pub fn is_participant(&self, participant_id: &str, role: Role) -> bool {
        match role {
            Role::Patient => self.patient_id == participant_id,
            Role::Doctor => self.doctor_id == participant_id,
        }
    }
}

/// A validated message waiting for its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub sender_id: String,
    pub sender_role: Role,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

/// Durable consultation records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsultationStore: Send + Sync {
    /// Get-or-create, reactivating an ended session. Returns the full log.
    async fn open_session(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<(ConsultationSession, SessionOpen), ConsultError>;

    /// Get-or-create without reactivation. Returns (session, created).
    async fn ensure_session(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<(ConsultationSession, bool), ConsultError>;

    async fn find_session(&self, appointment_id: &str) -> Result<Option<ConsultationSession>, ConsultError>;

    async fn session_meta(&self, appointment_id: &str) -> Result<Option<SessionMeta>, ConsultError>;

    /// Returns false if no session exists.
    async fn end_session(&self, appointment_id: &str, now: DateTime<Utc>) -> Result<bool, ConsultError>;

    /// Atomic append; fails with `NotFound` or `InactiveSession` without writing.
    async fn append_message(
        &self,
        appointment_id: &str,
        draft: MessageDraft,
        now: DateTime<Utc>,
    ) -> Result<Message, ConsultError>;

    /// Marks unread messages sent by the other role.
    async fn mark_read(
        &self,
        appointment_id: &str,
        reader_role: Role,
        now: DateTime<Utc>,
    ) -> Result<usize, ConsultError>;

    async fn active_sessions(
        &self,
        participant_id: &str,
        role: Role,
    ) -> Result<Vec<SessionSummary>, ConsultError>;
}

/// Appointment lookup owned by the scheduling collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppointmentDirectory: Send + Sync {
    async fn find_appointment(&self, id: &str) -> Result<Option<Appointment>, ConsultError>;
}

/// SQLite-backed store. Blocking queries run on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, ConsultError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ConsultError::internal(e)
            })?
            .map_err(|e| {
                error!("database error: {:#}", e);
                ConsultError::internal(e)
            })
    }
}

#[async_trait]
impl ConsultationStore for SqliteStore {
    async fn open_session(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<(ConsultationSession, SessionOpen), ConsultError> {
        let appointment = appointment.clone();
        self.blocking(move |db| {
            let (row, messages, outcome) = db.open_consultation(
                &appointment.id,
                &appointment.patient_id,
                &appointment.doctor_id,
                to_millis(now),
            )?;
            Ok((row.into_session(messages)?, outcome))
        })
        .await
    }

    async fn ensure_session(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<(ConsultationSession, bool), ConsultError> {
        let appointment = appointment.clone();
        self.blocking(move |db| {
            let (row, created) = db.ensure_consultation(
                &appointment.id,
                &appointment.patient_id,
                &appointment.doctor_id,
                to_millis(now),
            )?;
            let messages = db.get_messages(&appointment.id)?;
            Ok((row.into_session(messages)?, created))
        })
        .await
    }

    async fn find_session(&self, appointment_id: &str) -> Result<Option<ConsultationSession>, ConsultError> {
        let id = appointment_id.to_string();
        self.blocking(move |db| {
            let Some(row) = db.get_consultation(&id)? else {
                return Ok(None);
            };
            let messages = db.get_messages(&id)?;
            Ok(Some(row.into_session(messages)?))
        })
        .await
    }

    async fn session_meta(&self, appointment_id: &str) -> Result<Option<SessionMeta>, ConsultError> {
        let id = appointment_id.to_string();
        self.blocking(move |db| {
            Ok(db.get_consultation(&id)?.map(|row| SessionMeta {
                appointment_id: row.appointment_id,
                patient_id: row.patient_id,
                doctor_id: row.doctor_id,
                is_active: row.is_active,
            }))
        })
        .await
    }

    async fn end_session(&self, appointment_id: &str, now: DateTime<Utc>) -> Result<bool, ConsultError> {
        let id = appointment_id.to_string();
        self.blocking(move |db| db.end_consultation(&id, to_millis(now))).await
    }

    async fn append_message(
        &self,
        appointment_id: &str,
        draft: MessageDraft,
        now: DateTime<Utc>,
    ) -> Result<Message, ConsultError> {
        let id = appointment_id.to_string();
        let file_size = draft
            .file_size
            .map(i64::try_from)
            .transpose()
            .map_err(|_| ConsultError::InvalidMessage("fileSize out of range".into()))?;
        let row = NewMessage {
            sender_id: draft.sender_id,
            sender_role: draft.sender_role.as_str().to_string(),
            kind: draft.kind.as_str().to_string(),
            content: draft.content,
            file_url: draft.file_url,
            file_name: draft.file_name,
            file_size,
        };

        self.blocking(move |db| match db.append_message(&id, &row, to_millis(now))? {
            AppendOutcome::Appended(row) => Ok(Ok(row.into_message()?)),
            AppendOutcome::Missing => Ok(Err(ConsultError::NotFound)),
            AppendOutcome::Inactive => Ok(Err(ConsultError::InactiveSession)),
        })
        .await?
    }

    async fn mark_read(
        &self,
        appointment_id: &str,
        reader_role: Role,
        now: DateTime<Utc>,
    ) -> Result<usize, ConsultError> {
        let id = appointment_id.to_string();
        self.blocking(move |db| db.mark_read(&id, reader_role.as_str(), to_millis(now))).await
    }

    async fn active_sessions(
        &self,
        participant_id: &str,
        role: Role,
    ) -> Result<Vec<SessionSummary>, ConsultError> {
        let participant = participant_id.to_string();
        self.blocking(move |db| {
            db.active_consultations_for(&participant, role.as_str())?
                .into_iter()
                .map(|row| row.into_summary())
                .collect()
        })
        .await
    }
}

#[async_trait]
impl AppointmentDirectory for SqliteStore {
    async fn find_appointment(&self, id: &str) -> Result<Option<Appointment>, ConsultError> {
        let id = id.to_string();
        self.blocking(move |db| Ok(db.get_appointment(&id)?.map(|row| row.into_appointment())))
            .await
    }
}
