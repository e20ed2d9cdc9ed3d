//! Bridge from Postgres `NOTIFY` to the notification queue.
//!
//! The `discussions` insert trigger publishes each new id on the
//! `discussion_created` channel, so comments written by any process reach
//! this worker's queue. Notifications missed while disconnected are left
//! to the creation reconciler.

use std::time::Duration;

use showcase_core::types::DbId;
use showcase_db::DbPool;
use showcase_events::NotificationQueue;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;

/// Channel the insert trigger notifies on.
pub const DISCUSSION_CREATED_CHANNEL: &str = "discussion_created";

/// Pause after a receive error before trying again.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A connected, subscribed listener.
pub struct DiscussionListener {
    listener: PgListener,
}

impl DiscussionListener {
    /// Connect and subscribe. Notifications sent after this returns are
    /// buffered until [`run`](Self::run) picks them up.
    pub async fn connect(pool: &DbPool) -> Result<Self, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(DISCUSSION_CREATED_CHANNEL).await?;
        tracing::info!(channel = DISCUSSION_CREATED_CHANNEL, "Listening for new discussions");
        Ok(Self { listener })
    }

    /// Forward every notification to `queue` until cancelled.
    pub async fn run(mut self, queue: NotificationQueue, cancel: CancellationToken) {
        loop {
            let notification = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Discussion listener cancelled");
                    break;
                }
                n = self.listener.recv() => n,
            };

            match notification {
                Ok(n) => match n.payload().parse::<DbId>() {
                    Ok(discussion_id) => {
                        tracing::debug!(discussion_id, "Discussion created notification received");
                        if let Err(e) = queue.enqueue(discussion_id).await {
                            tracing::warn!(discussion_id, error = %e, "Failed to enqueue discussion");
                        }
                    }
                    Err(_) => {
                        tracing::warn!(payload = n.payload(), "Ignoring malformed notification payload");
                    }
                },
                Err(e) => {
                    // PgListener reconnects on the next recv.
                    tracing::error!(error = %e, "Discussion listener error");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    }
}
