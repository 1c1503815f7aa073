use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use grwm_common::SessionStatus;
use serde::Deserialize;
use serde_json::json;

use super::{sse, ws};
use crate::errors::PipelineError;
use crate::pipeline::Orchestrator;
use crate::stages::ghostwriter::ReadmeStyle;
use crate::stages::github::is_valid_login;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Stream idle interval before a keepalive is sent.
    pub idle_keepalive: Duration,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct StartRequest {
    #[serde(alias = "username", alias = "subjectId")]
    pub subject_id: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    /// Pre-confirmed README style; skips the suspend point.
    #[serde(default)]
    pub choice: Option<String>,
}

#[derive(Deserialize)]
pub struct ResumeRequest {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(alias = "style")]
    pub choice: String,
}

#[derive(Deserialize)]
pub struct ReviseRequest {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    pub instructions: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    InvalidState(String),
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::InvalidState(_) => "invalid_state",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let message = e.to_string();
        match e {
            PipelineError::NotFound { .. } => ApiError::NotFound(message),
            PipelineError::State { .. } => ApiError::InvalidState(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InvalidState(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

fn parse_style(choice: &str) -> Result<ReadmeStyle, ApiError> {
    choice.parse().map_err(|_| {
        let options: Vec<&str> = ReadmeStyle::ALL.iter().map(ReadmeStyle::as_str).collect();
        ApiError::BadRequest(format!(
            "Unknown style '{}'; expected one of: {}",
            choice,
            options.join(", ")
        ))
    })
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health_check))
        .route("/api/start", post(start_pipeline))
        .route("/api/resume", post(resume_pipeline))
        .route("/api/revise", post(revise_pipeline))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/stream/{id}", get(sse::stream_handler))
        .route("/api/ws/{id}", get(ws::ws_handler))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "grwm",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_check(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "active_sessions": state.orchestrator.active_sessions(),
        "timestamp": chrono::Utc::now(),
    }))
}

async fn start_pipeline(
    State(state): State<SharedState>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let subject_id = req.subject_id.trim();
    if !is_valid_login(subject_id) {
        return Err(ApiError::BadRequest(format!(
            "'{}' is not a valid GitHub username",
            subject_id
        )));
    }
    let choice = match req.choice.as_deref() {
        Some(choice) => Some(parse_style(choice.trim())?.as_str().to_string()),
        None => None,
    };

    let session_id = state.orchestrator.start(subject_id, req.preferences, choice)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session_id": session_id,
            "stream_url": format!("/api/stream/{}", session_id),
        })),
    ))
}

async fn resume_pipeline(
    State(state): State<SharedState>,
    Json(req): Json<ResumeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let style = parse_style(req.choice.trim())?;
    state.orchestrator.resume(&req.session_id, style.as_str())?;
    Ok(Json(json!({
        "session_id": req.session_id,
        "status": SessionStatus::Running,
    })))
}

async fn revise_pipeline(
    State(state): State<SharedState>,
    Json(req): Json<ReviseRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.instructions.trim().is_empty() {
        return Err(ApiError::BadRequest("instructions must not be empty".into()));
    }
    state.orchestrator.request_revision(&req.session_id, &req.instructions)?;
    Ok(Json(json!({
        "session_id": req.session_id,
        "status": SessionStatus::Running,
    })))
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.orchestrator.session(&id)?;
    Ok(Json(json!({
        "session_id": session.id(),
        "status": session.status(),
        "created_at": session.created_at(),
        "event_count": session.event_count(),
        "document": session.document_snapshot(),
    })))
}
