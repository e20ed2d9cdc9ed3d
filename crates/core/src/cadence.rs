//! Notification cadence: how often a user wants discussion emails.
//!
//! The string values must match the `users.notification_frequency` and
//! `notifications.cadence` column values (enforced by CHECK constraints in
//! the migrations).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Send one email per new comment, right away.
pub const CADENCE_IMMEDIATE: &str = "immediate";

/// Bundle pending comments into at most one email per hour.
pub const CADENCE_HOURLY: &str = "hourly";

/// Bundle pending comments into at most one email per day.
pub const CADENCE_DAILY: &str = "daily";

/// Never email this user about discussions.
pub const CADENCE_NEVER: &str = "never";

/// A recipient's delivery frequency preference.
///
/// Snapshotted onto each notification when it is created; later preference
/// changes never alter existing rows.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCadence {
    #[default]
    Immediate,
    Hourly,
    Daily,
    Never,
}

impl NotificationCadence {
    /// All cadences, in column-value order.
    pub const ALL: [NotificationCadence; 4] = [
        NotificationCadence::Immediate,
        NotificationCadence::Hourly,
        NotificationCadence::Daily,
        NotificationCadence::Never,
    ];

    /// Database / wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => CADENCE_IMMEDIATE,
            Self::Hourly => CADENCE_HOURLY,
            Self::Daily => CADENCE_DAILY,
            Self::Never => CADENCE_NEVER,
        }
    }

    /// Whether `flush` accepts this cadence. `Immediate` is flushable as a
    /// reconciliation sweep; `Never` has no rows to flush.
    pub fn is_flushable(self) -> bool {
        !matches!(self, Self::Never)
    }

    /// Stable numeric key, used to derive per-cadence advisory lock ids.
    pub fn lock_key(self) -> i64 {
        match self {
            Self::Immediate => 1,
            Self::Hourly => 2,
            Self::Daily => 3,
            Self::Never => 4,
        }
    }
}

impl fmt::Display for NotificationCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown cadence string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown notification cadence: {0}")]
pub struct UnknownCadence(pub String);

impl FromStr for NotificationCadence {
    type Err = UnknownCadence;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CADENCE_IMMEDIATE => Ok(Self::Immediate),
            CADENCE_HOURLY => Ok(Self::Hourly),
            CADENCE_DAILY => Ok(Self::Daily),
            CADENCE_NEVER => Ok(Self::Never),
            other => Err(UnknownCadence(other.to_string())),
        }
    }
}
