//! HTTP surface of consultations: history, active list, the upload bridge
//! and file download. Everything here sits behind [`middleware::require_auth`].

pub mod blob;
pub mod consultations;
pub mod error;
pub mod middleware;
pub mod state;
pub mod upload;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};

pub use state::{AppState, AppStateInner};

/// Authenticated consultation routes, ready to be merged into the server router.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/consultations/active", get(consultations::active_consultations))
        .route("/consultations/{appointment_id}", post(consultations::ensure_consultation))
        .route("/consultations/{appointment_id}/messages", get(consultations::get_messages))
        .route("/consultations/{appointment_id}/upload", post(upload::upload_media))
        .route("/files/{file_id}", get(upload::download_file))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state)
}
