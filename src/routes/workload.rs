use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::error::AppError;
use crate::models::workload::LifecycleReport;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/logs", get(logs))
}

async fn start(State(state): State<Arc<AppState>>) -> (StatusCode, Json<LifecycleReport>) {
    let _guard = state.ops.lock().await;
    let report = state.lifecycle.start().await;
    let status = if report.status.is_start_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}

async fn stop(State(state): State<Arc<AppState>>) -> (StatusCode, Json<LifecycleReport>) {
    let _guard = state.ops.lock().await;
    let report = state.lifecycle.stop().await;
    let status = if report.status.is_stop_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}

/// Current content of the game server's log file, line by line.
async fn logs(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let lines = read_log_lines(&state.config.logs_path).await?;
    Ok(Json(json!({ "logs": lines })))
}

async fn read_log_lines(path: &Path) -> Result<Vec<String>, AppError> {
    if !path.is_file() {
        return Err(AppError::NotFound(format!(
            "no server logs at {}",
            path.display()
        )));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(content.lines().map(str::to_string).collect())
}
