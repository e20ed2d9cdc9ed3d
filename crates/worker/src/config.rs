use showcase_events::config::env_or;
use showcase_events::{ConfigError, DispatchConfig, QueueConfig, ReconcileConfig};

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development except
/// `DATABASE_URL`, which `main` reads directly.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3001`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Run the in-process hourly/daily scheduler (default: `true`).
    /// Disable when an external cron drives the tick endpoints.
    pub scheduler_enabled: bool,
    pub dispatch: DispatchConfig,
    pub queue: QueueConfig,
    pub reconcile: ReconcileConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default   |
    /// |------------------------|-----------|
    /// | `HOST`                 | `0.0.0.0` |
    /// | `PORT`                 | `3001`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`      |
    /// | `SCHEDULER_ENABLED`    | `true`    |
    ///
    /// Dispatch, queue and reconciliation settings are read by
    /// [`DispatchConfig::from_env`], [`QueueConfig::from_env`] and
    /// [`ReconcileConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or("HOST", "0.0.0.0".to_string())?,
            port: env_or("PORT", 3001)?,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
            scheduler_enabled: env_or("SCHEDULER_ENABLED", true)?,
            dispatch: DispatchConfig::from_env()?,
            queue: QueueConfig::from_env()?,
            reconcile: ReconcileConfig::from_env()?,
        })
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout_secs: 30,
            scheduler_enabled: false,
            dispatch: DispatchConfig::default(),
            queue: QueueConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}
