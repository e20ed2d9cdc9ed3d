//! Repository for the `discussions` table.

use showcase_core::types::DbId;
use sqlx::PgPool;

use crate::models::discussion::{CreateDiscussion, Discussion, DiscussionEventRow};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, project_id, author_id, parent_id, body, created_at, updated_at";

/// Select list + joins producing a [`DiscussionEventRow`] for alias `d`.
const EVENT_SELECT: &str = "SELECT d.id, d.project_id, p.title AS project_title, \
        o.id AS owner_id, o.email AS owner_email, \
        o.first_name AS owner_first_name, o.last_name AS owner_last_name, \
        a.id AS author_id, a.email AS author_email, \
        a.first_name AS author_first_name, a.last_name AS author_last_name, \
        d.parent_id, \
        pa.id AS parent_author_id, pa.email AS parent_author_email, \
        pa.first_name AS parent_author_first_name, pa.last_name AS parent_author_last_name, \
        d.body, d.created_at \
     FROM discussions d \
     JOIN projects p ON p.id = d.project_id \
     LEFT JOIN users o ON o.id = p.owner_id \
     LEFT JOIN users a ON a.id = d.author_id \
     LEFT JOIN discussions parent ON parent.id = d.parent_id \
     LEFT JOIN users pa ON pa.id = parent.author_id";

/// Provides discussion persistence and the thread queries used for
/// recipient resolution.
pub struct DiscussionRepo;

impl DiscussionRepo {
    /// Insert a discussion, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateDiscussion,
    ) -> Result<Discussion, sqlx::Error> {
        let query = format!(
            "INSERT INTO discussions (project_id, author_id, parent_id, body)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Discussion>(&query)
            .bind(input.project_id)
            .bind(input.author_id)
            .bind(input.parent_id)
            .bind(&input.body)
            .fetch_one(pool)
            .await
    }

    /// Find a discussion by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Discussion>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM discussions WHERE id = $1");
        sqlx::query_as::<_, Discussion>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Load a discussion with its project owner, author, and parent author.
    pub async fn find_event_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<DiscussionEventRow>, sqlx::Error> {
        let query = format!("{EVENT_SELECT} WHERE d.id = $1");
        sqlx::query_as::<_, DiscussionEventRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All direct replies of a root discussion, oldest first.
    pub async fn list_replies_of(
        pool: &PgPool,
        root_id: DbId,
    ) -> Result<Vec<DiscussionEventRow>, sqlx::Error> {
        let query = format!("{EVENT_SELECT} WHERE d.parent_id = $1 ORDER BY d.created_at, d.id");
        sqlx::query_as::<_, DiscussionEventRow>(&query)
            .bind(root_id)
            .fetch_all(pool)
            .await
    }

    /// Record that notification creation finished for a discussion.
    ///
    /// Returns `false` if it was already marked or no longer exists.
    pub async fn mark_notified(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE discussions SET notified_at = NOW() WHERE id = $1 AND notified_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Ids of discussions at least `min_age_secs` old whose notification
    /// creation never finished, oldest first.
    pub async fn list_unnotified(
        pool: &PgPool,
        min_age_secs: f64,
        limit: i64,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT id FROM discussions \
             WHERE notified_at IS NULL \
               AND created_at <= NOW() - make_interval(secs => $1) \
             ORDER BY created_at, id \
             LIMIT $2",
        )
        .bind(min_age_secs)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Delete a discussion. Replies and notifications cascade.
    ///
    /// Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM discussions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
