//! Digest flush scheduler.
//!
//! [`DigestScheduler`] runs as a background task and fires the dispatcher's
//! flushes on two intervals: every hour it sweeps failed immediate
//! notifications and sends hourly digests, every day it sends daily digests.
//! External cron can drive the same flushes through the worker's tick
//! endpoints instead; per-cadence locking keeps the two from overlapping.

use std::sync::Arc;
use std::time::Duration;

use showcase_core::cadence::NotificationCadence;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::DeliveryDispatcher;

/// Period of the hourly tick.
const HOURLY_PERIOD: Duration = Duration::from_secs(3600);

/// Period of the daily tick.
const DAILY_PERIOD: Duration = Duration::from_secs(24 * 3600);

// ---------------------------------------------------------------------------
// DigestScheduler
// ---------------------------------------------------------------------------

/// Background service that triggers cadence flushes periodically.
pub struct DigestScheduler {
    dispatcher: Arc<DeliveryDispatcher>,
    hourly: Duration,
    daily: Duration,
}

impl DigestScheduler {
    pub fn new(dispatcher: Arc<DeliveryDispatcher>) -> Self {
        Self::with_periods(dispatcher, HOURLY_PERIOD, DAILY_PERIOD)
    }

    pub fn with_periods(dispatcher: Arc<DeliveryDispatcher>, hourly: Duration, daily: Duration) -> Self {
        Self {
            dispatcher,
            hourly,
            daily,
        }
    }

    /// Run the scheduler loop.
    ///
    /// The first ticks fire one full period after start. The loop exits
    /// gracefully when the provided [`CancellationToken`] is cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let start = Instant::now();
        let mut hourly = tokio::time::interval_at(start + self.hourly, self.hourly);
        let mut daily = tokio::time::interval_at(start + self.daily, self.daily);
        hourly.set_missed_tick_behavior(MissedTickBehavior::Skip);
        daily.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            hourly_secs = self.hourly.as_secs(),
            daily_secs = self.daily.as_secs(),
            "Digest scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Digest scheduler cancelled");
                    break;
                }
                _ = hourly.tick() => {
                    self.flush(NotificationCadence::Immediate).await;
                    self.flush(NotificationCadence::Hourly).await;
                }
                _ = daily.tick() => {
                    self.flush(NotificationCadence::Daily).await;
                }
            }
        }
    }

    async fn flush(&self, cadence: NotificationCadence) {
        if let Err(e) = self.dispatcher.flush(cadence).await {
            tracing::error!(%cadence, error = %e, "Scheduled flush failed");
        }
    }
}
