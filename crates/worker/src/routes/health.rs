use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database or the queue is unavailable.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    /// Whether queue workers are still consuming jobs.
    pub queue_open: bool,
    /// Free slots in the notification queue.
    pub queue_capacity_remaining: usize,
    pub scheduler_enabled: bool,
}

/// GET /health -- database reachability and notification queue state.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = showcase_db::health_check(&state.pool).await.is_ok();
    let queue_open = !state.queue.is_closed();

    Json(HealthResponse {
        status: if db_healthy && queue_open { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        queue_open,
        queue_capacity_remaining: state.queue.remaining_capacity(),
        scheduler_enabled: state.config.scheduler_enabled,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
