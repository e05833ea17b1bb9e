//! Server assembly: configuration, shared state and the router. The binary
//! in `main.rs` only adds logging, the listener and shutdown handling.

pub mod config;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use medora_api::blob::LocalBlobStore;
use medora_api::error::ApiError;
use medora_api::middleware::verify_token;
use medora_api::{AppState, AppStateInner};
use medora_db::Database;
use medora_gateway::connection;
use medora_gateway::dispatcher::Dispatcher;
use medora_gateway::handler::CommandHandler;
use medora_gateway::presence::ParticipantKey;
use medora_gateway::service::ConsultationService;

pub use config::ServerConfig;

/// Headroom over the file limit for multipart framing and form fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// State of the socket route.
#[derive(Clone)]
struct ServerState {
    handler: CommandHandler,
    jwt_secret: String,
}

/// Browsers cannot set headers on a socket upgrade, so the token rides in
/// the query string.
#[derive(Deserialize)]
struct WsAuth {
    token: Option<String>,
}

/// Wire up storage, the realtime gateway and the HTTP API into one router.
pub async fn build_app(config: &ServerConfig, db: Arc<Database>) -> Result<Router> {
    let service = ConsultationService::sqlite(db.clone());
    let dispatcher = Dispatcher::new();
    let handler = CommandHandler::new(service.clone(), dispatcher.clone());
    let blobs = LocalBlobStore::new(config.upload_dir.clone(), db, config.public_file_base.clone()).await?;

    let api_state: AppState = Arc::new(AppStateInner {
        service,
        realtime: Some(dispatcher),
        blobs: Arc::new(blobs),
        jwt_secret: config.jwt_secret.clone(),
        max_upload_bytes: config.max_upload_bytes,
    });

    Ok(router(handler, api_state, config.max_upload_bytes))
}

pub fn router(handler: CommandHandler, api_state: AppState, max_upload_bytes: usize) -> Router {
    let ws_state = ServerState {
        handler,
        jwt_secret: api_state.jwt_secret.clone(),
    };
    let ws_route = Router::new().route("/ws", get(ws_upgrade)).with_state(ws_state);

    Router::new()
        .route("/health", get(health))
        .merge(ws_route)
        .merge(medora_api::routes(api_state))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

/// The token is verified before upgrading; the connection is bound to its
/// subject and role for its whole lifetime.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(auth): Query<WsAuth>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = auth.token.ok_or(ApiError::Unauthenticated)?;
    let claims = verify_token(&token, &state.jwt_secret)?;
    let identity = ParticipantKey::new(claims.sub, claims.role);

    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, state.handler, identity)))
}
