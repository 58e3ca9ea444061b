//! HTTP endpoints

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Json, State};
use axum::routing::{get, post};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use lattice_serve_core::{RecognitionConfig, RecognizeRequest, RecognizeResponse};
use lattice_serve_decoder::recognize;

use crate::metrics::{record_request, record_request_seconds};
use crate::state::AppState;
use crate::websocket;
use crate::ApiError;

/// Build the application router.
pub fn create_router(state: AppState, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/v1/recognize", post(handle_recognize))
        .route("/v1/streaming", get(websocket::handle_upgrade))
        .route("/healthz", get(health_check))
        .route(
            "/metrics",
            get(move || std::future::ready(metrics.render())),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unary recognition request body.
#[derive(Debug, Deserialize)]
pub struct RecognizeBody {
    pub config: RecognitionConfig,
    #[serde(default)]
    pub uuid: Option<String>,
    /// Base64-encoded audio content.
    pub audio: String,
}

async fn handle_recognize(
    State(state): State<AppState>,
    Json(body): Json<RecognizeBody>,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let started = Instant::now();

    let audio = BASE64
        .decode(body.audio.as_bytes())
        .map_err(|e| ApiError::bad_request(format!("audio is not valid base64: {e}")))?;

    let request = RecognizeRequest {
        config: body.config,
        audio,
        uuid: body
            .uuid
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    };

    tracing::debug!(
        request_id = %request.uuid,
        model = %request.config.model_id(),
        bytes = request.audio.len(),
        "recognize request"
    );

    let dispatcher = Arc::clone(&state.dispatcher);
    let chunk_seconds = state.settings.chunk_seconds;
    let result = tokio::task::spawn_blocking(move || recognize(&dispatcher, &request, chunk_seconds))
        .await
        .map_err(|e| ApiError::internal(format!("decode task failed: {e}")))?;

    record_request("recognize", result.is_ok());
    record_request_seconds("recognize", started.elapsed().as_secs_f64());

    result.map(Json).map_err(ApiError::from)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "models": state.dispatcher.model_count(),
    }))
}
