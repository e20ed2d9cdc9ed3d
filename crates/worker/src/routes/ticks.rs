//! Scheduler tick endpoints for an external cron.
//!
//! `POST /internal/ticks/{cadence}` runs one flush and returns its
//! [`FlushSummary`]. `hourly` and `daily` send digests; `immediate` runs the
//! reconciliation sweep for failed immediate sends.

use axum::extract::{Path, State};
use axum::{routing::post, Json, Router};
use showcase_core::cadence::NotificationCadence;
use showcase_events::FlushSummary;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /internal/ticks/{cadence}
async fn tick(State(state): State<AppState>, Path(cadence): Path<String>) -> AppResult<Json<FlushSummary>> {
    let cadence: NotificationCadence = cadence
        .parse()
        .map_err(|e: showcase_core::cadence::UnknownCadence| AppError::BadRequest(e.to_string()))?;

    tracing::info!(%cadence, "Tick received");
    let summary = state.dispatcher.flush(cadence).await?;
    Ok(Json(summary))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/internal/ticks/{cadence}", post(tick))
}
