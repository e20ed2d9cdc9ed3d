//! PostgreSQL-backed implementations of the engine's capability traits.
//!
//! Thin adapters over the `showcase-db` repositories. Reads map to
//! [`NotifyError::Store`], writes to [`NotifyError::Ledger`].

use std::time::Duration;

use async_trait::async_trait;
use showcase_core::cadence::{NotificationCadence, UnknownCadence};
use showcase_core::discussion::DiscussionEvent;
use showcase_core::error::CoreError;
use showcase_core::types::{DbId, Timestamp};
use showcase_db::locks::CadenceLock;
use showcase_db::models::notification::{Notification, PendingNotificationRow};
use showcase_db::repositories::{DiscussionRepo, NotificationRepo, UserRepo};
use showcase_db::DbPool;

use crate::error::NotifyError;
use crate::ledger::{FlushLease, LedgerEntry, NotificationLedger, PendingNotification, RecordOutcome};
use crate::store::{DiscussionStore, PreferenceLookup};

fn parse_cadence(raw: &str) -> Result<NotificationCadence, NotifyError> {
    raw.parse()
        .map_err(|e: UnknownCadence| NotifyError::Core(CoreError::Internal(e.to_string())))
}

// ---------------------------------------------------------------------------
// PgDiscussionStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgDiscussionStore {
    pool: DbPool,
}

impl PgDiscussionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DiscussionStore for PgDiscussionStore {
    async fn get_event_by_id(&self, id: DbId) -> Result<Option<DiscussionEvent>, NotifyError> {
        let row = DiscussionRepo::find_event_by_id(&self.pool, id)
            .await
            .map_err(NotifyError::Store)?;
        Ok(row.map(DiscussionEvent::from))
    }

    async fn list_replies_of(&self, root_id: DbId) -> Result<Vec<DiscussionEvent>, NotifyError> {
        let rows = DiscussionRepo::list_replies_of(&self.pool, root_id)
            .await
            .map_err(NotifyError::Store)?;
        Ok(rows.into_iter().map(DiscussionEvent::from).collect())
    }
}

// ---------------------------------------------------------------------------
// PgPreferenceLookup
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgPreferenceLookup {
    pool: DbPool,
}

impl PgPreferenceLookup {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceLookup for PgPreferenceLookup {
    async fn cadence_of(&self, user_id: DbId) -> Result<NotificationCadence, NotifyError> {
        let frequency = UserRepo::get_notification_frequency(&self.pool, user_id)
            .await
            .map_err(NotifyError::Store)?;

        match frequency {
            Some(raw) => parse_cadence(&raw),
            None => Ok(NotificationCadence::Never),
        }
    }
}

// ---------------------------------------------------------------------------
// PgNotificationLedger
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgNotificationLedger {
    pool: DbPool,
}

impl PgNotificationLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl TryFrom<Notification> for LedgerEntry {
    type Error = NotifyError;

    fn try_from(row: Notification) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            recipient_id: row.recipient_id,
            discussion_id: row.discussion_id,
            cadence: parse_cadence(&row.cadence)?,
            sent: row.sent,
            created_at: row.created_at,
            sent_at: row.sent_at,
        })
    }
}

impl TryFrom<PendingNotificationRow> for PendingNotification {
    type Error = NotifyError;

    fn try_from(row: PendingNotificationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            cadence: parse_cadence(&row.cadence)?,
            created_at: row.created_at,
            recipient: row.recipient(),
            author: row.author(),
            discussion_id: row.discussion_id,
            project_id: row.project_id,
            project_title: row.project_title,
            body: row.body,
        })
    }
}

#[async_trait]
impl NotificationLedger for PgNotificationLedger {
    async fn record(
        &self,
        recipient_id: DbId,
        discussion_id: DbId,
        cadence: NotificationCadence,
    ) -> Result<RecordOutcome, NotifyError> {
        if cadence == NotificationCadence::Never {
            return Ok(RecordOutcome::Skipped);
        }

        let created =
            NotificationRepo::create_if_absent(&self.pool, recipient_id, discussion_id, cadence.as_str())
                .await
                .map_err(NotifyError::Ledger)?;

        match created {
            Some(row) => Ok(RecordOutcome::Created(row.try_into()?)),
            None => Ok(RecordOutcome::Duplicate),
        }
    }

    async fn unsent_by_cadence(
        &self,
        cadence: NotificationCadence,
    ) -> Result<Vec<PendingNotification>, NotifyError> {
        let rows = NotificationRepo::list_unsent_by_cadence(&self.pool, cadence.as_str())
            .await
            .map_err(NotifyError::Store)?;
        rows.into_iter().map(PendingNotification::try_from).collect()
    }

    async fn mark_sent(&self, ids: &[DbId], sent_at: Timestamp) -> Result<u64, NotifyError> {
        NotificationRepo::mark_sent(&self.pool, ids, sent_at)
            .await
            .map_err(NotifyError::Ledger)
    }

    async fn claim(&self, ids: &[DbId], ttl: Duration) -> Result<Vec<DbId>, NotifyError> {
        NotificationRepo::claim_unsent(&self.pool, ids, ttl.as_secs_f64())
            .await
            .map_err(NotifyError::Ledger)
    }

    async fn release_claims(&self, ids: &[DbId]) -> Result<(), NotifyError> {
        NotificationRepo::release_claims(&self.pool, ids)
            .await
            .map_err(NotifyError::Ledger)?;
        Ok(())
    }

    async fn mark_discussion_notified(&self, discussion_id: DbId) -> Result<(), NotifyError> {
        DiscussionRepo::mark_notified(&self.pool, discussion_id)
            .await
            .map_err(NotifyError::Ledger)?;
        Ok(())
    }

    async fn unnotified_discussions(
        &self,
        min_age: Duration,
        limit: i64,
    ) -> Result<Vec<DbId>, NotifyError> {
        DiscussionRepo::list_unnotified(&self.pool, min_age.as_secs_f64(), limit)
            .await
            .map_err(NotifyError::Store)
    }

    async fn acquire_flush_lease(
        &self,
        cadence: NotificationCadence,
    ) -> Result<Option<FlushLease>, NotifyError> {
        let lock = CadenceLock::try_acquire(&self.pool, cadence.lock_key())
            .await
            .map_err(NotifyError::Ledger)?;
        Ok(lock.map(FlushLease::Postgres))
    }
}
