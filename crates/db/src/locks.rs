//! Transaction-scoped PostgreSQL advisory locks.
//!
//! A [`CadenceLock`] holds an open transaction that owns
//! `pg_try_advisory_xact_lock(key)`. Committing (or dropping, which rolls
//! back) ends the transaction and releases the lock, so a crashed holder can
//! never leave the lock behind.

use sqlx::{PgPool, Postgres, Transaction};

/// Namespace mixed into every key so these locks never collide with other
/// advisory lock users of the same database.
const LOCK_NAMESPACE: i64 = 0x5348_4f57 << 16;

/// An acquired advisory lock.
pub struct CadenceLock {
    tx: Transaction<'static, Postgres>,
    key: i64,
}

impl CadenceLock {
    /// Try to take the lock for `key` without waiting.
    ///
    /// Returns `None` if another session holds it.
    pub async fn try_acquire(pool: &PgPool, key: i64) -> Result<Option<Self>, sqlx::Error> {
        let key = LOCK_NAMESPACE | key;
        let mut tx = pool.begin().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(key)
            .fetch_one(&mut *tx)
            .await?;

        if acquired {
            Ok(Some(Self { tx, key }))
        } else {
            tx.rollback().await?;
            tracing::debug!(key, "Advisory lock held elsewhere");
            Ok(None)
        }
    }

    /// Release the lock by ending its transaction.
    pub async fn release(self) -> Result<(), sqlx::Error> {
        let key = self.key;
        self.tx.commit().await?;
        tracing::debug!(key, "Advisory lock released");
        Ok(())
    }
}
