//! HTTP handlers for sandbox management.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::{ExecResult, FileNode, ProjectType, Session};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Cached runtime verdict: "available", "unavailable" or "unknown".
    pub runtime: String,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let runtime = match state.sandboxes.runtime_availability() {
        Some(true) => "available",
        Some(false) => "unavailable",
        None => "unknown",
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        runtime: runtime.to_string(),
    })
}

/// Request body for sandbox creation.
#[derive(Debug, Deserialize)]
pub struct CreateSandboxRequest {
    pub session_id: String,
    #[serde(default)]
    pub project_type: ProjectType,
}

/// Create (or replace) the sandbox for a session id.
pub async fn create_sandbox(
    State(state): State<AppState>,
    Json(request): Json<CreateSandboxRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let container_ref = state
        .sandboxes
        .create_sandbox(&request.session_id, request.project_type)
        .await?;
    info!(session_id = %request.session_id, container_ref = %container_ref, "sandbox requested");

    let session = state
        .sandboxes
        .get_status(&request.session_id)
        .ok_or_else(|| ApiError::internal("session vanished during creation"))?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// List all live sessions.
pub async fn list_sandboxes(State(state): State<AppState>) -> Json<Vec<Session>> {
    Json(state.sandboxes.list_sessions())
}

/// Fetch one session's record.
pub async fn get_sandbox(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Session>> {
    state
        .sandboxes
        .get_status(&session_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("session not found: {session_id}")))
}

/// Request body for command execution.
#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    pub command: String,
}

/// Run a shell command inside a session's sandbox.
pub async fn exec_command(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ExecRequest>,
) -> ApiResult<Json<ExecResult>> {
    let result = state.sandboxes.exec(&session_id, &request.command).await?;
    Ok(Json(result))
}

/// List the sandbox workspace tree with file contents.
pub async fn list_files(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<FileNode>>> {
    let nodes = state.sandboxes.list_files(&session_id).await?;
    Ok(Json(nodes))
}

/// Request body for workspace writes.
#[derive(Debug, Deserialize)]
pub struct WriteFileRequest {
    pub path: String,
    pub content: String,
}

/// Write one file into the sandbox workspace.
pub async fn write_file(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<WriteFileRequest>,
) -> ApiResult<StatusCode> {
    state
        .sandboxes
        .write_file(&session_id, &request.path, &request.content)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Response for extension requests.
#[derive(Debug, Serialize)]
pub struct ExtendResponse {
    /// Whether the one-time extension was granted.
    pub extended: bool,
}

/// Grant a session its one-time timeout extension.
pub async fn extend_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<ExtendResponse> {
    let extended = state.sandboxes.extend_session(&session_id);
    Json(ExtendResponse { extended })
}

/// Destroy one sandbox. Idempotent.
pub async fn destroy_sandbox(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    state.sandboxes.destroy_sandbox(&session_id).await;
    StatusCode::NO_CONTENT
}

/// Response for bulk teardown.
#[derive(Debug, Serialize)]
pub struct DestroyAllResponse {
    pub destroyed: usize,
}

/// Destroy every sandbox this process tracks.
pub async fn destroy_all_sandboxes(State(state): State<AppState>) -> Json<DestroyAllResponse> {
    let destroyed = state.sandboxes.destroy_all_sandboxes().await;
    Json(DestroyAllResponse { destroyed })
}
