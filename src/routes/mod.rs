pub mod backups;
pub mod sync;
pub mod workload;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload = state.config.max_upload_bytes;

    Router::new()
        .nest("/api/server", workload::router())
        .nest("/api/backups", backups::router())
        .nest("/api/sync", sync::router())
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
