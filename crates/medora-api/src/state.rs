use std::sync::Arc;

use medora_gateway::dispatcher::Dispatcher;
use medora_gateway::service::ConsultationService;

use crate::blob::BlobStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub service: ConsultationService,
    /// Realtime gateway for upload broadcasts. `None` when the HTTP API runs
    /// without a socket server; uploads are then persisted but not pushed.
    pub realtime: Option<Dispatcher>,
    pub blobs: Arc<dyn BlobStore>,
    pub jwt_secret: String,
    pub max_upload_bytes: usize,
}
