use serde::{Deserialize, Serialize};

use crate::models::{ConsultationSession, Message, Role, SessionSummary};

// -- JWT Claims --

/// Claims of the bearer token issued by the auth service. Only verified here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Participant id (user id for patients, doctor id for doctors)
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

// -- Consultations --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveConsultationsResponse {
    pub consultations: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session: ConsultationSession,
    pub created: bool,
}

// -- Uploads --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: Message,
    pub file_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
