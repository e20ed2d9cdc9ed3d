//! Repository for the `notifications` table.

use showcase_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::notification::{Notification, PendingNotificationRow};

/// Column list for `notifications` queries.
const COLUMNS: &str = "id, recipient_id, discussion_id, cadence, sent, created_at, sent_at";

/// Provides the notification ledger operations.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Create a pending notification unless one already exists for the
    /// `(recipient, discussion)` pair.
    ///
    /// Returns `None` when the row already existed, so re-running creation
    /// for the same discussion never produces a second row.
    pub async fn create_if_absent(
        pool: &PgPool,
        recipient_id: DbId,
        discussion_id: DbId,
        cadence: &str,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!(
            "INSERT INTO notifications (recipient_id, discussion_id, cadence) \
             VALUES ($1, $2, $3) \
             ON CONFLICT ON CONSTRAINT uq_notifications_recipient_discussion DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(recipient_id)
            .bind(discussion_id)
            .bind(cadence)
            .fetch_optional(pool)
            .await
    }

    /// Find a notification by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notifications WHERE id = $1");
        sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All notifications created for a discussion, ordered by recipient.
    pub async fn list_for_discussion(
        pool: &PgPool,
        discussion_id: DbId,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE discussion_id = $1 \
             ORDER BY recipient_id"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(discussion_id)
            .fetch_all(pool)
            .await
    }

    /// Unsent notifications of one cadence, ordered by recipient then by
    /// creation time, so that each recipient's rows are contiguous.
    pub async fn list_unsent_by_cadence(
        pool: &PgPool,
        cadence: &str,
    ) -> Result<Vec<PendingNotificationRow>, sqlx::Error> {
        sqlx::query_as::<_, PendingNotificationRow>(
            "SELECT n.id, n.cadence, n.created_at, \
                    r.id AS recipient_id, r.email AS recipient_email, \
                    r.first_name AS recipient_first_name, r.last_name AS recipient_last_name, \
                    d.id AS discussion_id, d.project_id, p.title AS project_title, d.body, \
                    a.id AS author_id, a.email AS author_email, \
                    a.first_name AS author_first_name, a.last_name AS author_last_name \
             FROM notifications n \
             JOIN users r ON r.id = n.recipient_id \
             JOIN discussions d ON d.id = n.discussion_id \
             JOIN projects p ON p.id = d.project_id \
             LEFT JOIN users a ON a.id = d.author_id \
             WHERE n.cadence = $1 AND n.sent = false \
             ORDER BY n.recipient_id, n.created_at, n.id",
        )
        .bind(cadence)
        .fetch_all(pool)
        .await
    }

    /// Mark a batch of notifications sent in a single statement.
    ///
    /// Rows already sent are left untouched, so their `sent_at` never moves.
    /// Returns the number of rows transitioned.
    pub async fn mark_sent(
        pool: &PgPool,
        ids: &[DbId],
        sent_at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE notifications \
             SET sent = true, sent_at = $2 \
             WHERE id = ANY($1) AND sent = false",
        )
        .bind(ids)
        .bind(sent_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Claim unsent notifications for delivery until `ttl_secs` from now.
    ///
    /// Rows already sent, or claimed by a sender whose claim has not yet
    /// expired, are skipped. Concurrent claims on one row serialize on the
    /// row lock, so at most one caller gets each id back.
    pub async fn claim_unsent(
        pool: &PgPool,
        ids: &[DbId],
        ttl_secs: f64,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_scalar(
            "UPDATE notifications \
             SET claimed_until = NOW() + make_interval(secs => $2) \
             WHERE id = ANY($1) AND sent = false \
               AND (claimed_until IS NULL OR claimed_until <= NOW()) \
             RETURNING id",
        )
        .bind(ids)
        .bind(ttl_secs)
        .fetch_all(pool)
        .await
    }

    /// Drop the claims on rows that are still unsent.
    pub async fn release_claims(pool: &PgPool, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE notifications SET claimed_until = NULL WHERE id = ANY($1) AND sent = false",
        )
        .bind(ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Number of unsent notifications for a recipient across all cadences.
    pub async fn pending_count_for_recipient(
        pool: &PgPool,
        recipient_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND sent = false",
        )
        .bind(recipient_id)
        .fetch_one(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }
}
