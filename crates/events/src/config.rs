//! Environment-driven configuration for dispatch and the work queue.

use std::str::FromStr;
use std::time::Duration;

/// Default base URL of the web frontend, used for links in emails.
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

/// Default upper bound on a single email gateway call.
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;

/// Default work-queue capacity.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of queue workers.
const DEFAULT_WORKERS: usize = 4;

/// Default attempts per job (first try included).
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry; doubles per attempt.
const DEFAULT_RETRY_BASE_MS: u64 = 1000;

/// Default wait for queue space before an enqueue gives up.
const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 5000;

/// Default period between reconciliation passes.
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Default age a discussion must reach before it is considered stuck.
const DEFAULT_RECONCILE_MIN_AGE_SECS: u64 = 300;

/// Default number of discussions re-enqueued per pass.
const DEFAULT_RECONCILE_BATCH: i64 = 500;

/// Error for malformed configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Read `var` and parse it, falling back to `default` when unset.
pub fn env_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

/// Settings for composing and sending notification emails.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Base URL for discussion links, without trailing slash.
    pub frontend_url: String,
    /// Upper bound on one gateway call; exceeding it is a delivery failure.
    pub send_timeout: Duration,
}

impl DispatchConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                  |
    /// |---------------------------|--------------------------|
    /// | `FRONTEND_URL`            | `http://localhost:3000`  |
    /// | `EMAIL_SEND_TIMEOUT_SECS` | `30`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        let frontend_url: String = env_or("FRONTEND_URL", DEFAULT_FRONTEND_URL.to_string())?;
        let timeout_secs: u64 = env_or("EMAIL_SEND_TIMEOUT_SECS", DEFAULT_SEND_TIMEOUT_SECS)?;

        Ok(Self {
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            send_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// How long a sender holds a notification while emailing it. Outlasts
    /// one gateway call plus the ledger write that follows it.
    pub fn claim_ttl(&self) -> Duration {
        self.send_timeout.saturating_mul(2)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

/// Settings for the notification work queue and its worker pool.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    pub workers: usize,
    /// Attempts per job for retryable failures, first try included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further attempt.
    pub retry_base: Duration,
    /// How long `enqueue` waits for space in a full queue.
    pub enqueue_timeout: Duration,
}

impl QueueConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `NOTIFY_QUEUE_CAPACITY`     | `1024`  |
    /// | `NOTIFY_WORKERS`            | `4`     |
    /// | `NOTIFY_MAX_ATTEMPTS`       | `3`     |
    /// | `NOTIFY_RETRY_BASE_MS`      | `1000`  |
    /// | `NOTIFY_ENQUEUE_TIMEOUT_MS` | `5000`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let capacity = env_or("NOTIFY_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;
        let workers = env_or("NOTIFY_WORKERS", DEFAULT_WORKERS)?;
        let max_attempts = env_or("NOTIFY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        let retry_base_ms = env_or("NOTIFY_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS)?;
        let enqueue_timeout_ms = env_or("NOTIFY_ENQUEUE_TIMEOUT_MS", DEFAULT_ENQUEUE_TIMEOUT_MS)?;

        if capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "NOTIFY_QUEUE_CAPACITY",
                value: capacity.to_string(),
            });
        }

        Ok(Self {
            capacity,
            workers: workers.max(1),
            max_attempts: max_attempts.max(1),
            retry_base: Duration::from_millis(retry_base_ms),
            enqueue_timeout: Duration::from_millis(enqueue_timeout_ms),
        })
    }

    /// Delay before attempt `attempt + 1`, doubling from `retry_base`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base.saturating_mul(factor)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            enqueue_timeout: Duration::from_millis(DEFAULT_ENQUEUE_TIMEOUT_MS),
        }
    }
}

// ---------------------------------------------------------------------------
// ReconcileConfig
// ---------------------------------------------------------------------------

/// Settings for re-enqueueing discussions whose notifications were never
/// created.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub interval: Duration,
    /// Discussions younger than this are left to the normal hand-off.
    pub min_age: Duration,
    pub batch_size: i64,
}

impl ReconcileConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `NOTIFY_RECONCILE_INTERVAL_SECS` | `300`   |
    /// | `NOTIFY_RECONCILE_MIN_AGE_SECS`  | `300`   |
    /// | `NOTIFY_RECONCILE_BATCH`         | `500`   |
    pub fn from_env() -> Result<Self, ConfigError> {
        let interval_secs = env_or("NOTIFY_RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS)?;
        let min_age_secs = env_or("NOTIFY_RECONCILE_MIN_AGE_SECS", DEFAULT_RECONCILE_MIN_AGE_SECS)?;
        let batch_size = env_or("NOTIFY_RECONCILE_BATCH", DEFAULT_RECONCILE_BATCH)?;

        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "NOTIFY_RECONCILE_INTERVAL_SECS",
                value: interval_secs.to_string(),
            });
        }

        Ok(Self {
            interval: Duration::from_secs(interval_secs),
            min_age: Duration::from_secs(min_age_secs),
            batch_size: batch_size.max(1),
        })
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            min_age: Duration::from_secs(DEFAULT_RECONCILE_MIN_AGE_SECS),
            batch_size: DEFAULT_RECONCILE_BATCH,
        }
    }
}
