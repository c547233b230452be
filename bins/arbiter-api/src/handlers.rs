// HTTP route handlers for the Arbiter API

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use arbiter_common::types::{Language, RunRequest, RunResponse, Submission};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

/// Header carrying the authenticated caller, set by the auth layer in front of the API
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Code is required")]
    MissingCode,
    #[error("Question not found")]
    QuestionNotFound,
    #[error("Submission not found.")]
    SubmissionNotFound,
    #[error("Unauthorized.")]
    Forbidden,
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::MissingCode => StatusCode::BAD_REQUEST,
            ApiError::QuestionNotFound | ApiError::SubmissionNotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            error!(error = %format!("{:#}", e), "Request failed");
        }
        let body = serde_json::json!({
            "success": false,
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthenticated)
}

/// Bounded metric label: known languages by canonical name, everything else pooled
pub fn language_label(language: &str) -> &'static str {
    Language::from_str(language)
        .map(|l| l.as_str())
        .unwrap_or("unsupported")
}

fn default_language() -> String {
    "cpp".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(default)]
    pub question_id: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// POST /run - custom-input run, answered synchronously by the executor
pub async fn run_custom(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> impl IntoResponse {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected /run body");
            return (
                StatusCode::BAD_REQUEST,
                Json(RunResponse::failed("Code is required.".to_string(), None)),
            );
        }
    };

    if payload.code.as_deref().map_or(true, str::is_empty) {
        return (
            StatusCode::BAD_REQUEST,
            Json(RunResponse::failed("Code is required.".to_string(), None)),
        );
    }

    match state.executor.run(&payload).await {
        Ok(response) => {
            metrics::RUN_PROXY_TOTAL.with_label_values(&["ok"]).inc();
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            metrics::RUN_PROXY_TOTAL.with_label_values(&["executor_error"]).inc();
            warn!(error = %format!("{:#}", e), "Custom run failed");
            (
                StatusCode::BAD_REQUEST,
                Json(RunResponse::failed(e.to_string(), None)),
            )
        }
    }
}

/// POST /submissions - create a Pending submission and queue it for judging
pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = caller(&headers)?;
    let Json(payload) = payload.map_err(|rejection| {
        debug!(error = %rejection.body_text(), "Rejected submission body");
        ApiError::MissingCode
    })?;

    let code = match payload.code {
        Some(code) if !code.is_empty() => code,
        _ => return Err(ApiError::MissingCode),
    };

    if !state.store.question_exists(&payload.question_id).await? {
        info!(question_id = %payload.question_id, "Question not found");
        return Err(ApiError::QuestionNotFound);
    }

    let submission = Submission::new_pending(user_id, payload.question_id, payload.language, code);
    state.store.create(&submission).await?;

    metrics::SUBMISSIONS_CREATED_TOTAL
        .with_label_values(&[language_label(&submission.language)])
        .inc();
    info!(
        submission_id = %submission.id,
        question_id = %submission.question_id,
        language = %submission.language,
        "Submission queued"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "submissionId": submission.id,
        })),
    ))
}

/// GET /submissions/{id}
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = caller(&headers)?;

    // A malformed id cannot name any stored submission
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::SubmissionNotFound)?;
    let submission = state
        .store
        .get(id)
        .await?
        .ok_or(ApiError::SubmissionNotFound)?;

    if submission.user_id != user_id {
        warn!(submission_id = %id, "Submission requested by another user");
        return Err(ApiError::Forbidden);
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "submission": submission,
    })))
}

/// GET /submissions - the caller's submissions, newest first
pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = caller(&headers)?;
    let submissions = state.store.list_for_user(&user_id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "submissions": submissions,
    })))
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text format
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
