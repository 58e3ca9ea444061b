//! lattice-serve transport layer
//!
//! HTTP endpoint for unary recognition, WebSocket endpoint for streaming
//! and bidirectional recognition, plus health and metrics endpoints. The
//! decoding core is synchronous; handlers bridge onto it with blocking
//! tasks.

pub mod http;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use lattice_serve_core::ServeError;

/// A serving error with its transport status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ServeError> for ApiError {
    fn from(err: ServeError) -> Self {
        let status = match &err {
            ServeError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            ServeError::InvalidAudio(_) | ServeError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ServeError::ModelLoad { .. }
            | ServeError::DuplicateModel(_)
            | ServeError::EngineInternal(_)
            | ServeError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}
