use std::sync::Arc;

use showcase_events::{DeliveryDispatcher, NotificationQueue};

use crate::config::WorkerConfig;

/// Shared state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub pool: showcase_db::DbPool,
    pub config: Arc<WorkerConfig>,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub queue: NotificationQueue,
}
