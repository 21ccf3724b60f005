use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nexora_core::{ErrorKind, RagError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Server(String),
}

/// Service error rendered as `{error, message}` with a status derived from its kind.
#[derive(Debug)]
pub struct ApiError(pub RagError);

impl<E: Into<RagError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Dependency | ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(kind = %kind, "request failed: {}", self.0);
        } else {
            tracing::debug!(kind = %kind, "request rejected: {}", self.0);
        }
        let body = ErrorBody {
            error: kind.as_str(),
            message: self.0.user_message(),
        };
        (status, Json(body)).into_response()
    }
}
