//! Showcase discussion notification engine.
//!
//! This crate decides who hears about a new comment, when, and how the
//! emails go out:
//!
//! - [`RecipientResolver`]: deduplicated recipient set for a discussion.
//! - [`NotificationLedger`]: durable pending/sent record with the cadence
//!   snapshotted at creation.
//! - [`DeliveryDispatcher`]: immediate sends on creation and per-recipient
//!   digest flushes, isolating failures per recipient.
//! - [`NotificationQueue`] / [`NotificationWorkers`]: bounded hand-off from
//!   the request path to background workers.
//! - [`DigestScheduler`]: in-process hourly/daily flush trigger.
//! - [`CreationReconciler`]: re-enqueues discussions whose notifications
//!   were never created.
//! - [`delivery`]: email gateway trait, SMTP and logging gateways, templates.
//! - [`DiscussionService`]: request-path entry for posting and deleting
//!   comments.

pub mod compose;
pub mod config;
pub mod delivery;
pub mod digest;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod postgres;
pub mod queue;
pub mod reconcile;
pub mod resolver;
pub mod service;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{ConfigError, DispatchConfig, QueueConfig, ReconcileConfig};
pub use delivery::email::{EmailConfig, SmtpEmailGateway};
pub use delivery::{EmailGateway, LoggingGateway};
pub use digest::DigestScheduler;
pub use dispatcher::{CreationSummary, DeliveryDispatcher, FlushSummary};
pub use error::NotifyError;
pub use ledger::{NotificationLedger, PendingNotification, RecordOutcome};
pub use postgres::{PgDiscussionStore, PgNotificationLedger, PgPreferenceLookup};
pub use queue::{NotificationQueue, NotificationWorkers, QueueError};
pub use reconcile::CreationReconciler;
pub use resolver::RecipientResolver;
pub use service::{DiscussionService, ServiceError};
pub use store::{DiscussionStore, PreferenceLookup};
