//! Repository for the `users` table.

use showcase_core::types::DbId;
use sqlx::PgPool;

use crate::models::user::{CreateUser, User};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str =
    "id, email, first_name, last_name, notification_frequency, created_at, updated_at";

/// Provides user lookups and notification-preference updates.
pub struct UserRepo;

impl UserRepo {
    /// Insert a new user, returning the created row.
    ///
    /// If `notification_frequency` is `None`, defaults to `immediate`.
    pub async fn create(pool: &PgPool, input: &CreateUser) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, first_name, last_name, notification_frequency)
             VALUES ($1, $2, $3, COALESCE($4, 'immediate'))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.email)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(&input.notification_frequency)
            .fetch_one(pool)
            .await
    }

    /// Find a user by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Current notification frequency for a user, or `None` if the user is gone.
    pub async fn get_notification_frequency(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT notification_frequency FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Change a user's notification frequency.
    ///
    /// Only future notifications are affected; existing ledger rows keep the
    /// cadence they were created with. Returns `false` if no user matched.
    pub async fn update_notification_frequency(
        pool: &PgPool,
        id: DbId,
        frequency: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET notification_frequency = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(frequency)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
