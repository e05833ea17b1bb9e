use axum::Extension;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use medora_types::api::{ActiveConsultationsResponse, Claims, HistoryResponse, SessionResponse};
use medora_types::error::ConsultError;
use medora_types::models::Role;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /consultations/{appointment_id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Path(appointment_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session = state
        .service
        .history(&appointment_id, &claims.sub, claims.role)
        .await?;

    Ok(Json(HistoryResponse {
        messages: session.messages,
        is_active: session.is_active,
    }))
}

/// GET /consultations/active: the caller's active sessions, most recent first.
pub async fn active_consultations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ActiveConsultationsResponse>, ApiError> {
    let consultations = state.service.active_for(&claims.sub, claims.role).await?;
    Ok(Json(ActiveConsultationsResponse { consultations }))
}

/// POST /consultations/{appointment_id}: appointment-accept hook. Doctor only;
/// returns the session, creating it if this is the first call.
pub async fn ensure_consultation(
    State(state): State<AppState>,
    Path(appointment_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.role != Role::Doctor {
        return Err(ConsultError::Unauthorized.into());
    }

    let (session, created) = state
        .service
        .ensure_session(&appointment_id, &claims.sub, Role::Doctor)
        .await?;

    let status = if created {
        info!("Consultation {} created by doctor {}", appointment_id, claims.sub);
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(SessionResponse { session, created })))
}
