use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::error::AppError;
use crate::services::engine::SyncOutcome;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(sync))
}

async fn sync(State(state): State<Arc<AppState>>) -> Result<Json<SyncOutcome>, AppError> {
    let _guard = state.ops.lock().await;
    let outcome = state.engine.sync(&state.cancel).await?;
    Ok(Json(outcome))
}
