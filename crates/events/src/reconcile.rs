//! Recovery of lost notification jobs.
//!
//! A discussion is marked notified once its ledger rows are written. Jobs
//! can still go missing before that: the queue stayed full, a worker gave
//! up, the process died, or a NOTIFY arrived while no listener was
//! connected. [`CreationReconciler`] periodically re-enqueues discussions
//! that are old enough and still unmarked.

use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ReconcileConfig;
use crate::error::NotifyError;
use crate::ledger::NotificationLedger;
use crate::queue::{NotificationQueue, QueueError};

/// Background service that re-enqueues discussions never notified.
pub struct CreationReconciler {
    ledger: Arc<dyn NotificationLedger>,
    queue: NotificationQueue,
    config: ReconcileConfig,
}

impl CreationReconciler {
    pub fn new(ledger: Arc<dyn NotificationLedger>, queue: NotificationQueue, config: ReconcileConfig) -> Self {
        Self { ledger, queue, config }
    }

    /// Run the reconciliation loop until `cancel` fires.
    ///
    /// The first pass runs one interval after start.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = period.as_secs(),
            min_age_secs = self.config.min_age.as_secs(),
            "Creation reconciler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Creation reconciler cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        tracing::error!(error = %e, "Creation reconciliation failed");
                    }
                }
            }
        }
    }

    /// Enqueue one batch of unnotified discussions. Returns how many were
    /// enqueued.
    ///
    /// Stops early if the queue stays full or closes; the rest wait for the
    /// next pass.
    pub async fn reconcile_once(&self) -> Result<usize, NotifyError> {
        let stuck = self
            .ledger
            .unnotified_discussions(self.config.min_age, self.config.batch_size)
            .await?;

        let mut requeued = 0;
        for discussion_id in &stuck {
            match self.queue.enqueue(*discussion_id).await {
                Ok(()) => requeued += 1,
                Err(QueueError::Full(_)) => {
                    tracing::warn!(
                        requeued,
                        remaining = stuck.len() - requeued,
                        "Queue full, deferring reconciliation"
                    );
                    break;
                }
                Err(QueueError::Closed) => {
                    tracing::warn!("Notification queue closed, stopping reconciliation");
                    break;
                }
            }
        }

        if requeued > 0 {
            tracing::info!(requeued, "Re-enqueued discussions without notifications");
        }
        Ok(requeued)
    }
}
