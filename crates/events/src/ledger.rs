//! The notification ledger: one row per (recipient, discussion).
//!
//! Rows are created pending with the recipient's cadence snapshotted, and
//! the only transition is pending to sent, performed by the dispatcher.
//! A sender claims a row before emailing it, so a row is never emailed by
//! two senders at once. The ledger also tracks which discussions have had
//! all their rows written.

use std::time::Duration;

use async_trait::async_trait;
use showcase_core::cadence::NotificationCadence;
use showcase_core::discussion::{DiscussionEvent, Participant};
use showcase_core::types::{DbId, Timestamp};
use showcase_db::locks::CadenceLock;

use crate::error::NotifyError;

/// A ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: DbId,
    pub recipient_id: DbId,
    pub discussion_id: DbId,
    pub cadence: NotificationCadence,
    pub sent: bool,
    pub created_at: Timestamp,
    pub sent_at: Option<Timestamp>,
}

/// Result of [`NotificationLedger::record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// A new pending row was written.
    Created(LedgerEntry),
    /// A row for this (recipient, discussion) already existed.
    Duplicate,
    /// The recipient's cadence is `Never`; nothing was written.
    Skipped,
}

/// An unsent notification with everything needed to email it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification {
    pub id: DbId,
    pub cadence: NotificationCadence,
    pub created_at: Timestamp,
    pub recipient: Participant,
    pub discussion_id: DbId,
    pub project_id: DbId,
    pub project_title: String,
    pub author: Option<Participant>,
    pub body: String,
}

impl PendingNotification {
    /// Pair a freshly recorded entry with the event it was recorded for.
    pub fn from_event(entry: &LedgerEntry, recipient: Participant, event: &DiscussionEvent) -> Self {
        Self {
            id: entry.id,
            cadence: entry.cadence,
            created_at: entry.created_at,
            recipient,
            discussion_id: event.id,
            project_id: event.project_id,
            project_title: event.project_title.clone(),
            author: event.author.clone(),
            body: event.body.clone(),
        }
    }
}

/// Exclusive right to flush one cadence, across processes.
pub enum FlushLease {
    /// No cross-process lock is needed (single-process or in-memory ledgers).
    Local,
    /// Backed by a transaction-scoped Postgres advisory lock.
    Postgres(CadenceLock),
}

impl FlushLease {
    pub async fn release(self) -> Result<(), NotifyError> {
        match self {
            Self::Local => Ok(()),
            Self::Postgres(lock) => lock.release().await.map_err(NotifyError::Ledger),
        }
    }
}

/// Durable record of pending and sent notifications.
#[async_trait]
pub trait NotificationLedger: Send + Sync {
    /// Record a pending notification with `cadence` snapshotted.
    ///
    /// Writes nothing for `Never`. At most one row ever exists per
    /// (recipient, discussion), so re-running creation is safe.
    async fn record(
        &self,
        recipient_id: DbId,
        discussion_id: DbId,
        cadence: NotificationCadence,
    ) -> Result<RecordOutcome, NotifyError>;

    /// Unsent notifications of `cadence`, ordered by recipient then by
    /// creation time ascending.
    async fn unsent_by_cadence(
        &self,
        cadence: NotificationCadence,
    ) -> Result<Vec<PendingNotification>, NotifyError>;

    /// Mark `ids` sent at `sent_at` in one atomic update. Already-sent rows
    /// are untouched. Returns the number of rows transitioned.
    async fn mark_sent(&self, ids: &[DbId], sent_at: Timestamp) -> Result<u64, NotifyError>;

    /// Claim unsent `ids` for delivery for `ttl`.
    ///
    /// Returns the ids this caller now holds. Rows already sent, or held by
    /// another sender whose claim has not expired, are left out.
    async fn claim(&self, ids: &[DbId], ttl: Duration) -> Result<Vec<DbId>, NotifyError>;

    /// Give up the claims on `ids` so the rows can be retried right away.
    async fn release_claims(&self, ids: &[DbId]) -> Result<(), NotifyError>;

    /// Record that every row for `discussion_id` has been written.
    async fn mark_discussion_notified(&self, discussion_id: DbId) -> Result<(), NotifyError>;

    /// Discussions at least `min_age` old that were never marked notified,
    /// oldest first, at most `limit` of them.
    async fn unnotified_discussions(
        &self,
        min_age: Duration,
        limit: i64,
    ) -> Result<Vec<DbId>, NotifyError>;

    /// Try to take the cross-process flush lease for `cadence`.
    ///
    /// `Ok(None)` means another flush of the same cadence is in progress.
    async fn acquire_flush_lease(
        &self,
        _cadence: NotificationCadence,
    ) -> Result<Option<FlushLease>, NotifyError> {
        Ok(Some(FlushLease::Local))
    }
}
