// HTTP route handlers for the Arbiter executor

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use arbiter_common::types::{RunRequest, RunResponse};
use std::sync::Arc;
use tracing::debug;

use crate::executor::ServiceError;
use crate::{metrics, AppState};

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::MissingCode | ServiceError::TooLarge(_) => StatusCode::BAD_REQUEST,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Internal details (paths, OS errors) stay in the logs
        let output = match self {
            ServiceError::Internal(_) => "Internal execution error".to_string(),
            other => other.to_string(),
        };
        (status, Json(RunResponse::failed(output, None))).into_response()
    }
}

/// POST /run - Stage, compile and run code against one input
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, ServiceError> {
    // A body without a usable `code` string is the same client error as a missing one
    let Json(payload) = payload.map_err(|rejection| {
        debug!(error = %rejection.body_text(), "Rejected /run body");
        ServiceError::MissingCode
    })?;
    state.service.run(payload).await.map(Json)
}

/// GET / - Liveness banner
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "online": "compiler" }))
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    (StatusCode::OK, metrics::render())
}
