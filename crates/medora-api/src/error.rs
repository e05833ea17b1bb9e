use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use medora_types::api::ErrorBody;
use medora_types::error::ConsultError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Consult(#[from] ConsultError),

    #[error("missing or invalid bearer token")]
    Unauthenticated,

    #[error("{0}")]
    BadRequest(String),

    #[error("upload exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Consult(ConsultError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Consult(ConsultError::Unauthorized) => StatusCode::FORBIDDEN,
            ApiError::Consult(ConsultError::InactiveSession) => StatusCode::CONFLICT,
            ApiError::Consult(ConsultError::InvalidMessage(_)) => StatusCode::BAD_REQUEST,
            ApiError::Consult(ConsultError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Consult(err) => err.reason(),
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::BadRequest(_) => "bad-request",
            ApiError::PayloadTooLarge(_) => "payload-too-large",
            ApiError::Internal(_) => "internal-error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }
        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
