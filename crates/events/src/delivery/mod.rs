//! Outbound email delivery.
//!
//! [`EmailGateway`] is the single capability the dispatcher sends through.
//! [`SmtpEmailGateway`](email::SmtpEmailGateway) renders templates and sends
//! via SMTP; [`LoggingGateway`] only logs, for setups without SMTP.

pub mod email;
pub mod templates;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use self::email::EmailError;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Why a single send attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("Template render error: {0}")]
    Render(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Templated email
// ---------------------------------------------------------------------------

/// Templates the engine knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    /// One new comment, sent immediately.
    DiscussionNotification,
    /// A recipient's pending comments, bundled.
    DiscussionDigest,
}

impl EmailTemplate {
    pub fn name(self) -> &'static str {
        match self {
            Self::DiscussionNotification => "discussion_notification",
            Self::DiscussionDigest => "discussion_digest",
        }
    }
}

/// A message ready for the gateway: addressing plus template and context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplatedEmail {
    pub to: String,
    pub subject: String,
    pub template: EmailTemplate,
    pub context: serde_json::Value,
}

/// Sends one templated email per call.
#[async_trait]
pub trait EmailGateway: Send + Sync {
    async fn send_templated(&self, email: &TemplatedEmail) -> Result<(), DeliveryError>;
}

// ---------------------------------------------------------------------------
// LoggingGateway
// ---------------------------------------------------------------------------

/// Gateway that logs each email instead of sending it.
///
/// Used when SMTP is not configured so that the rest of the pipeline
/// (ledger transitions, digests) still runs end to end.
#[derive(Debug, Default)]
pub struct LoggingGateway;

#[async_trait]
impl EmailGateway for LoggingGateway {
    async fn send_templated(&self, email: &TemplatedEmail) -> Result<(), DeliveryError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            template = email.template.name(),
            "Email delivery not configured, logging instead of sending"
        );
        Ok(())
    }
}
