use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::io::StreamReader;

use crate::error::AppError;
use crate::models::archive::{matches_convention, ArchiveRecord};
use crate::models::transfer::TransferRecord;
use crate::services::engine::RestoreOutcome;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{name}", delete(remove))
        .route("/{name}/restore", post(restore))
        .route("/upload/{name}", post(upload))
}

async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.engine.list()?))
}

#[derive(Deserialize, Default)]
struct CreateBody {
    backup: Option<String>,
}

async fn create(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateBody>>,
) -> Result<Json<TransferRecord>, AppError> {
    let _guard = state.ops.lock().await;
    let label = body.and_then(|Json(b)| b.backup);
    let record = state.engine.backup(label).await?;
    Ok(Json(record))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ArchiveRecord>, AppError> {
    let _guard = state.ops.lock().await;
    Ok(Json(state.engine.delete(&name)?))
}

async fn restore(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RestoreOutcome>, AppError> {
    let _guard = state.ops.lock().await;
    Ok(Json(state.engine.restore(&name).await?))
}

#[derive(Deserialize, Default)]
struct UploadQuery {
    #[serde(default)]
    restore: bool,
}

/// Accept an archive pushed by the client. With `?restore=true` the
/// uploaded archive replaces the live data immediately afterwards.
async fn upload(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<serde_json::Value>, AppError> {
    if !matches_convention(&name) {
        return Err(AppError::BadRequest(format!(
            "archive name {name} does not match the backup naming convention"
        )));
    }

    let _guard = state.ops.lock().await;

    let total_bytes = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let stream = body.into_data_stream();
    let reader = StreamReader::new(
        futures_util::TryStreamExt::map_err(stream, std::io::Error::other),
    );

    let record = state
        .engine
        .upload_from_stream(reader, &name, total_bytes)
        .await?;

    if query.restore {
        let outcome = state.engine.restore(&name).await?;
        return Ok(Json(serde_json::json!({
            "uploaded": record,
            "restored": outcome,
        })));
    }

    Ok(Json(serde_json::json!({ "uploaded": record })))
}
