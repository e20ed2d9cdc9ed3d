//! Error taxonomy for notification creation and delivery.

use showcase_core::cadence::NotificationCadence;
use showcase_core::error::CoreError;
use showcase_core::types::DbId;

use crate::delivery::DeliveryError;

/// Errors raised by the resolver, ledger, and dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The referenced discussion (or other entity) no longer exists.
    /// Logged and dropped; never retried.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// The email gateway failed. The notification stays pending for the
    /// next flush.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// A write to the notification ledger failed. The whole invocation is
    /// safe to re-run.
    #[error("Ledger write failed: {0}")]
    Ledger(#[source] sqlx::Error),

    /// A read from the discussion store or preference lookup failed.
    #[error("Store read failed: {0}")]
    Store(#[source] sqlx::Error),

    /// `flush` was asked for a cadence that has no deliverable rows.
    #[error("Cadence {0} cannot be flushed")]
    InvalidCadence(NotificationCadence),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl NotifyError {
    /// Whether re-running the failed invocation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Ledger(_) | Self::Store(_))
    }

    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        Self::NotFound { entity, id }
    }
}
