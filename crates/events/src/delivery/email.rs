//! Email notification delivery via SMTP.
//!
//! [`SmtpEmailGateway`] renders a [`TemplatedEmail`] and sends it as a
//! multipart (text + HTML) message over the `lettre` async SMTP transport.
//! Configuration is loaded from environment variables; if `SMTP_HOST` is not
//! set, [`EmailConfig::from_env`] returns `None` and the caller should fall
//! back to [`LoggingGateway`](super::LoggingGateway).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::templates::TemplateRenderer;
use super::{DeliveryError, EmailGateway, TemplatedEmail};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@showcase.local";

/// Suffix appended to every subject line.
const SUBJECT_SUFFIX: &str = " - Showcase";

/// SMTP socket timeout; the dispatcher enforces its own overall limit on top.
const SMTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration for the SMTP email gateway.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    /// Optional SMTP username.
    pub smtp_user: Option<String>,
    /// Optional SMTP password.
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that email
    /// delivery is not configured.
    ///
    /// | Variable        | Required | Default                   |
    /// |-----------------|----------|---------------------------|
    /// | `SMTP_HOST`     | yes      | -                         |
    /// | `SMTP_PORT`     | no       | `587`                     |
    /// | `SMTP_FROM`     | no       | `noreply@showcase.local`  |
    /// | `SMTP_USER`     | no       | -                         |
    /// | `SMTP_PASSWORD` | no       | -                         |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// SmtpEmailGateway
// ---------------------------------------------------------------------------

/// Sends templated notification emails via SMTP.
pub struct SmtpEmailGateway {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl SmtpEmailGateway {
    /// Build the gateway and its pooled SMTP transport.
    pub fn new(config: &EmailConfig, renderer: Arc<dyn TemplateRenderer>) -> Result<Self, EmailError> {
        let from: Mailbox = config.from_address.parse()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from,
            mailer: builder.build(),
            renderer,
        })
    }

    fn build_message(&self, email: &TemplatedEmail) -> Result<Message, DeliveryError> {
        let rendered = self.renderer.render(email.template, &email.context)?;
        let to: Mailbox = email.to.parse().map_err(EmailError::from)?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("{}{SUBJECT_SUFFIX}", email.subject))
            .multipart(MultiPart::alternative_plain_html(rendered.text, rendered.html))
            .map_err(|e| EmailError::Build(e.to_string()).into())
    }
}

#[async_trait]
impl EmailGateway for SmtpEmailGateway {
    async fn send_templated(&self, email: &TemplatedEmail) -> Result<(), DeliveryError> {
        let message = self.build_message(email)?;
        self.mailer.send(message).await.map_err(EmailError::from)?;

        tracing::info!(to = %email.to, template = email.template.name(), "Notification email sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
