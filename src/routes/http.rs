// GET/POST handlers over the telemetry service

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use super::{AppState, ApiError};
use crate::runtime::ContainerAction;
use crate::version::{NAME, VERSION};

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

pub(super) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.telemetry.health().await)
}

pub(super) async fn system_stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.telemetry.system_snapshot().await)
}

pub(super) async fn containers_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.telemetry.containers().await)
}

pub(super) async fn container_detail_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.telemetry.container_detail(&id).await?))
}

#[derive(Debug, Deserialize)]
pub(super) struct LogParams {
    tail: Option<u32>,
    /// Unix seconds.
    since: Option<i64>,
}

/// GET /api/container/{id}/logs: historical lines, no follow.
pub(super) async fn container_logs_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LogParams>,
) -> Result<impl IntoResponse, ApiError> {
    let tail = state.config.streaming.clamp_history_tail(params.tail);
    let since = params.since.map(checked_since).transpose()?;
    let logs = state.telemetry.container_logs(&id, tail, since).await?;
    Ok(Json(serde_json::json!({
        "container_id": id,
        "logs": logs,
    })))
}

/// The runtime takes `since` as a 32-bit count of seconds.
fn checked_since(since: i64) -> Result<i64, ApiError> {
    match i32::try_from(since) {
        Ok(s) if s >= 0 => Ok(since),
        _ => Err(ApiError::BadRequest(format!(
            "since must be between 0 and {} seconds, got {}",
            i32::MAX,
            since
        ))),
    }
}

pub(super) async fn networks_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.telemetry.networks().await)
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryParams {
    tail: Option<u32>,
}

/// GET /api/network/{name}/logs: every member's tail merged by timestamp.
pub(super) async fn network_logs_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let tail = state.config.streaming.clamp_history_tail(params.tail);
    let logs = state.telemetry.network_logs(&name, tail).await?;
    Ok(Json(serde_json::json!({
        "network": name,
        "logs": logs,
    })))
}

pub(super) async fn daemon_info_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.telemetry.daemon_info().await?))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ActionParams {
    #[serde(default)]
    force: bool,
}

/// POST /api/container/{id}/{action}
pub(super) async fn container_action_handler(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
    Query(params): Query<ActionParams>,
) -> Result<impl IntoResponse, ApiError> {
    let action = ContainerAction::parse(&action, params.force)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown action: {}", action)))?;
    state.telemetry.apply(&id, action).await?;
    Ok(Json(serde_json::json!({
        "status": action.past_tense(),
        "container_id": id,
    })))
}
