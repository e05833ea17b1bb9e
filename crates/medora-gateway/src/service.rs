//! Coordinator and relay rules: who may join, what may be appended, and the
//! session lifecycle. Transport agnostic; the socket handler and the HTTP
//! upload bridge both go through here.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use medora_db::{Database, SessionOpen};
use medora_types::error::ConsultError;
use medora_types::models::{
    Appointment, ConsultationSession, Message, MessageKind, MessagePayload, Role, SessionSummary,
};

use crate::store::{AppointmentDirectory, ConsultationStore, MessageDraft, SqliteStore};

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub session: ConsultationSession,
    pub opened: SessionOpen,
}

/// An already stored file, as handed over by blob storage.
#[derive(Debug, Clone)]
pub struct FileReference {
    pub url: String,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
}

#[derive(Clone)]
pub struct ConsultationService {
    store: Arc<dyn ConsultationStore>,
    appointments: Arc<dyn AppointmentDirectory>,
}

impl ConsultationService {
    pub fn new(store: Arc<dyn ConsultationStore>, appointments: Arc<dyn AppointmentDirectory>) -> Self {
        Self {
            store,
            appointments,
        }
    }

    /// Service backed by one SQLite database for both sessions and appointments.
    pub fn sqlite(db: Arc<Database>) -> Self {
        let store = SqliteStore::new(db);
        Self::new(Arc::new(store.clone()), Arc::new(store))
    }

    /// Resolve the appointment and check the caller is its party for `role`.
    pub async fn authorize(
        &self,
        appointment_id: &str,
        participant_id: &str,
        role: Role,
    ) -> Result<Appointment, ConsultError> {
        let appointment = self
            .appointments
            .find_appointment(appointment_id)
            .await?
            .ok_or(ConsultError::NotFound)?;

        if !appointment.admits(participant_id, role) {
            return Err(ConsultError::Unauthorized);
        }
        Ok(appointment)
    }

    /// Authorize, then fetch-or-create the session and make it active.
    pub async fn join(
        &self,
        appointment_id: &str,
        participant_id: &str,
        role: Role,
    ) -> Result<JoinOutcome, ConsultError> {
        let appointment = self.authorize(appointment_id, participant_id, role).await?;
        let (session, opened) = self.store.open_session(&appointment, Utc::now()).await?;

        match opened {
            SessionOpen::Created => info!("Consultation {} created by {} {}", appointment_id, role, participant_id),
            SessionOpen::Reactivated => info!("Consultation {} reactivated by {} {}", appointment_id, role, participant_id),
            SessionOpen::AlreadyActive => {}
        }

        Ok(JoinOutcome { session, opened })
    }

    /// Idempotent creation used when an appointment gets accepted.
    pub async fn ensure_session(
        &self,
        appointment_id: &str,
        participant_id: &str,
        role: Role,
    ) -> Result<(ConsultationSession, bool), ConsultError> {
        let appointment = self.authorize(appointment_id, participant_id, role).await?;
        let (session, created) = self.store.ensure_session(&appointment, Utc::now()).await?;
        if created {
            info!("Consultation {} opened for accepted appointment", appointment_id);
        }
        Ok((session, created))
    }

    pub async fn end(&self, appointment_id: &str) -> Result<(), ConsultError> {
        if !self.store.end_session(appointment_id, Utc::now()).await? {
            return Err(ConsultError::NotFound);
        }
        info!("Consultation {} ended", appointment_id);
        Ok(())
    }

    /// Validate and persist a socket message. Nothing is written on failure.
    pub async fn send_message(
        &self,
        appointment_id: &str,
        sender_id: &str,
        role: Role,
        payload: MessagePayload,
    ) -> Result<Message, ConsultError> {
        let meta = self
            .store
            .session_meta(appointment_id)
            .await?
            .ok_or(ConsultError::NotFound)?;

        if !meta.is_participant(sender_id, role) {
            return Err(ConsultError::Unauthorized);
        }

        if !meta.is_active {
            return Err(ConsultError::InactiveSession);
        }
        let kind = payload.validate()?;

        let draft = draft_from_payload(sender_id, role, kind, payload);
        self.store.append_message(appointment_id, draft, Utc::now()).await
    }

    /// Checks an upload must pass before its bytes are stored.
    pub async fn check_upload(
        &self,
        appointment_id: &str,
        sender_id: &str,
        role: Role,
    ) -> Result<(), ConsultError> {
        self.authorize(appointment_id, sender_id, role).await?;
        let meta = self
            .store
            .session_meta(appointment_id)
            .await?
            .ok_or(ConsultError::NotFound)?;
        if !meta.is_active {
            return Err(ConsultError::InactiveSession);
        }
        Ok(())
    }

    /// Persist a media message for a file that blob storage already holds.
    pub async fn upload_media(
        &self,
        appointment_id: &str,
        sender_id: &str,
        role: Role,
        file: FileReference,
    ) -> Result<Message, ConsultError> {
        self.authorize(appointment_id, sender_id, role).await?;

        let meta = self
            .store
            .session_meta(appointment_id)
            .await?
            .ok_or(ConsultError::NotFound)?;

        if !meta.is_active {
            return Err(ConsultError::InactiveSession);
        }
        let kind = MessageKind::for_content_type(&file.content_type);
        let payload = MessagePayload::media(kind, file.url, file.file_name, file.file_size);
        let kind = payload.validate()?;

        let draft = draft_from_payload(sender_id, role, kind, payload);
        self.store.append_message(appointment_id, draft, Utc::now()).await
    }

    /// Mark the other party's messages as read. Returns how many changed.
    pub async fn mark_read(
        &self,
        appointment_id: &str,
        reader_id: &str,
        role: Role,
    ) -> Result<usize, ConsultError> {
        let meta = self
            .store
            .session_meta(appointment_id)
            .await?
            .ok_or(ConsultError::NotFound)?;

        if !meta.is_participant(reader_id, role) {
            return Err(ConsultError::Unauthorized);
        }

        self.store.mark_read(appointment_id, role, Utc::now()).await
    }

    /// Full session for an authorized participant.
    pub async fn history(
        &self,
        appointment_id: &str,
        participant_id: &str,
        role: Role,
    ) -> Result<ConsultationSession, ConsultError> {
        self.authorize(appointment_id, participant_id, role).await?;
        self.store
            .find_session(appointment_id)
            .await?
            .ok_or(ConsultError::NotFound)
    }

    pub async fn active_for(&self, participant_id: &str, role: Role) -> Result<Vec<SessionSummary>, ConsultError> {
        self.store.active_sessions(participant_id, role).await
    }
}

fn draft_from_payload(sender_id: &str, role: Role, kind: MessageKind, payload: MessagePayload) -> MessageDraft {
    MessageDraft {
        sender_id: sender_id.to_string(),
        sender_role: role,
        kind,
        content: payload.content.filter(|c| !c.trim().is_empty()),
        file_url: payload.file_url,
        file_name: payload.file_name,
        file_size: payload.file_size,
    }
}
