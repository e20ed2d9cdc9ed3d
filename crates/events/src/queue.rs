//! Bounded hand-off from the request path to background workers.
//!
//! Posting a comment only enqueues its id; [`NotificationWorkers`] pick ids
//! off the queue and run
//! [`DeliveryDispatcher::on_discussion_created`](crate::DeliveryDispatcher::on_discussion_created).
//! Retryable failures are re-run with exponential backoff. Re-running is
//! safe because ledger writes are idempotent. A job that never completes is
//! picked up again by [`CreationReconciler`](crate::CreationReconciler).

use std::sync::Arc;
use std::time::Duration;

use showcase_core::types::DbId;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::QueueConfig;
use crate::dispatcher::DeliveryDispatcher;
use crate::error::NotifyError;

/// Why a job could not be enqueued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Notification queue stayed full for {0:?}")]
    Full(Duration),

    #[error("Notification queue is closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// NotificationQueue
// ---------------------------------------------------------------------------

/// Sending half of the notification work queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<DbId>,
    enqueue_timeout: Duration,
}

impl NotificationQueue {
    /// Create a queue holding at most `capacity` waiting jobs, with the
    /// default enqueue timeout.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<DbId>) {
        Self::from_config(&QueueConfig {
            capacity,
            ..QueueConfig::default()
        })
    }

    pub fn from_config(config: &QueueConfig) -> (Self, mpsc::Receiver<DbId>) {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let queue = Self {
            sender,
            enqueue_timeout: config.enqueue_timeout,
        };
        (queue, receiver)
    }

    /// Enqueue notification creation for a discussion.
    ///
    /// Waits for space while the queue is full, up to the enqueue timeout,
    /// then fails with [`QueueError::Full`]. A job that could not be
    /// enqueued is recovered by reconciliation.
    pub async fn enqueue(&self, discussion_id: DbId) -> Result<(), QueueError> {
        match tokio::time::timeout(self.enqueue_timeout, self.sender.send(discussion_id)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(QueueError::Closed),
            Err(_) => {
                tracing::warn!(
                    discussion_id,
                    timeout_ms = self.enqueue_timeout.as_millis() as u64,
                    "Notification queue full, leaving discussion for reconciliation"
                );
                Err(QueueError::Full(self.enqueue_timeout))
            }
        }
    }

    /// Free slots left before [`enqueue`](Self::enqueue) has to wait.
    pub fn remaining_capacity(&self) -> usize {
        self.sender.capacity()
    }

    /// `true` once every worker has exited.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ---------------------------------------------------------------------------
// NotificationWorkers
// ---------------------------------------------------------------------------

/// Pool of tasks consuming the notification queue.
pub struct NotificationWorkers {
    tracker: TaskTracker,
}

impl NotificationWorkers {
    /// Spawn `config.workers` tasks sharing `receiver`.
    ///
    /// On cancellation the workers stop waiting for new jobs, process
    /// whatever is still queued once, and exit.
    pub fn spawn(
        dispatcher: Arc<DeliveryDispatcher>,
        receiver: mpsc::Receiver<DbId>,
        config: QueueConfig,
        cancel: CancellationToken,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let config = Arc::new(config);
        let tracker = TaskTracker::new();

        for worker_id in 0..config.workers.max(1) {
            tracker.spawn(run_worker(
                worker_id,
                Arc::clone(&dispatcher),
                Arc::clone(&receiver),
                Arc::clone(&config),
                cancel.clone(),
            ));
        }
        tracker.close();

        tracing::info!(workers = config.workers.max(1), "Notification workers started");
        Self { tracker }
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        self.tracker.wait().await;
        tracing::info!("Notification workers stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    dispatcher: Arc<DeliveryDispatcher>,
    receiver: Arc<Mutex<mpsc::Receiver<DbId>>>,
    config: Arc<QueueConfig>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(discussion_id) = job else {
            tracing::debug!(worker_id, "Notification queue closed");
            return;
        };
        process(&dispatcher, discussion_id, &config, &cancel).await;
    }

    loop {
        let next = receiver.lock().await.try_recv();
        let Ok(discussion_id) = next else { break };
        process(&dispatcher, discussion_id, &config, &cancel).await;
    }
    tracing::debug!(worker_id, "Notification worker drained");
}

/// Run one job, retrying retryable failures with backoff.
async fn process(
    dispatcher: &DeliveryDispatcher,
    discussion_id: DbId,
    config: &QueueConfig,
    cancel: &CancellationToken,
) {
    let mut attempt = 1;
    loop {
        match dispatcher.on_discussion_created(discussion_id).await {
            Ok(_) => return,
            Err(NotifyError::NotFound { .. }) => {
                tracing::warn!(discussion_id, "Discussion deleted before notification, dropping job");
                return;
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts && !cancel.is_cancelled() => {
                let delay = config.backoff(attempt);
                tracing::warn!(
                    discussion_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Notification creation failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    discussion_id,
                    attempt,
                    error = %e,
                    "Notification creation failed, giving up"
                );
                return;
            }
        }
    }
}
