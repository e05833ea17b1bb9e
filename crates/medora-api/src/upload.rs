use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use tracing::{info, warn};

use medora_gateway::service::FileReference;
use medora_types::api::{Claims, UploadResponse};
use medora_types::error::ConsultError;
use medora_types::events::ServerEvent;
use medora_types::models::Role;

use crate::blob::NewBlob;
use crate::error::ApiError;
use crate::state::AppState;

struct UploadForm {
    file_name: String,
    content_type: String,
    bytes: Bytes,
    sender_role: Role,
}

async fn read_form(mut multipart: Multipart, max_bytes: usize) -> Result<UploadForm, ApiError> {
    let mut file: Option<(String, String, Bytes)> = None;
    let mut sender_role: Option<Role> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                if bytes.len() > max_bytes {
                    return Err(ApiError::PayloadTooLarge(max_bytes));
                }
                file = Some((file_name, content_type, bytes));
            }
            Some("senderRole") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                sender_role = Some(text.trim().parse::<Role>()?);
            }
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("no file part in upload".into()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".into()));
    }
    let sender_role = sender_role.ok_or_else(|| ApiError::BadRequest("senderRole is required".into()))?;

    Ok(UploadForm {
        file_name,
        content_type,
        bytes,
        sender_role,
    })
}

/// POST /consultations/{appointment_id}/upload: store the file, persist a
/// media message and push it to the room when the realtime gateway is attached.
pub async fn upload_media(
    State(state): State<AppState>,
    Path(appointment_id): Path<String>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_form(multipart, state.max_upload_bytes).await?;
    if form.sender_role != claims.role {
        return Err(ConsultError::Unauthorized.into());
    }

    state
        .service
        .check_upload(&appointment_id, &claims.sub, form.sender_role)
        .await?;

    let file_name = form.file_name.clone();
    let content_type = form.content_type.clone();
    let stored = state
        .blobs
        .store(NewBlob {
            owner_id: claims.sub.clone(),
            file_name: form.file_name,
            content_type: form.content_type,
            bytes: form.bytes,
        })
        .await
        .map_err(ApiError::internal)?;

    let file = FileReference {
        url: stored.url.clone(),
        file_name,
        file_size: stored.size,
        content_type,
    };
    let message = match state
        .service
        .upload_media(&appointment_id, &claims.sub, form.sender_role, file)
        .await
    {
        Ok(message) => message,
        Err(err) => {
            if let Err(e) = state.blobs.delete(&stored.id).await {
                warn!("Failed to remove orphaned upload {}: {}", stored.id, e);
            }
            return Err(err.into());
        }
    };

    info!(
        "{} {} uploaded {} ({} bytes) to consultation {}",
        claims.role, claims.sub, stored.id, stored.size, appointment_id
    );

    match &state.realtime {
        Some(dispatcher) => {
            dispatcher
                .broadcast_to_room(
                    &appointment_id,
                    ServerEvent::MessageBroadcast {
                        appointment_id: appointment_id.clone(),
                        message: message.clone(),
                    },
                )
                .await;
        }
        None => warn!(
            "No realtime gateway attached; upload {} to {} not pushed",
            message.id, appointment_id
        ),
    }

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message,
            file_url: stored.url,
        }),
    ))
}

/// GET /files/{file_id}
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let content = state
        .blobs
        .load(&file_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ConsultError::NotFound)?;

    let disposition = format!(
        "inline; filename=\"{}\"",
        content.file_name.replace(['"', '\\', '\r', '\n'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, content.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content.bytes,
    ))
}
