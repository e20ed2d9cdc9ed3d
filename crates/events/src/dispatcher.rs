//! Notification delivery orchestration.
//!
//! [`DeliveryDispatcher`] has two entry points:
//!
//! - [`on_discussion_created`](DeliveryDispatcher::on_discussion_created):
//!   resolve recipients, record one ledger row each with the recipient's
//!   current cadence, and send the immediate ones right away.
//! - [`flush`](DeliveryDispatcher::flush): send everything pending for a
//!   cadence, one digest per recipient, marking a recipient's rows sent only
//!   after their email went out.
//!
//! A failed send leaves its rows pending for the next flush and never stops
//! other recipients from being served; neither does a failed ledger write,
//! which is reported once the batch is done. Flushes of the same cadence are
//! serialized in-process and, through the ledger's flush lease, across
//! processes. Immediate sends claim their row first, so the creation path
//! and the reconciliation sweep never email the same notification at once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use showcase_core::cadence::NotificationCadence;
use showcase_core::types::DbId;
use tokio::sync::Mutex;

use crate::compose;
use crate::config::DispatchConfig;
use crate::delivery::{DeliveryError, EmailGateway, TemplatedEmail};
use crate::error::NotifyError;
use crate::ledger::{NotificationLedger, PendingNotification, RecordOutcome};
use crate::resolver::RecipientResolver;
use crate::store::{DiscussionStore, PreferenceLookup};

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// What [`DeliveryDispatcher::on_discussion_created`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreationSummary {
    pub discussion_id: DbId,
    /// Size of the resolved recipient set.
    pub recipients: usize,
    /// Ledger rows written.
    pub recorded: usize,
    /// Recipients skipped because their cadence is `Never`.
    pub skipped_never: usize,
    /// Recipients that already had a row for this discussion.
    pub duplicates: usize,
    /// Immediate emails sent successfully.
    pub sent_immediately: usize,
    /// Immediate emails that failed and were left pending.
    pub failed_immediately: usize,
}

/// What happened to one immediate notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImmediateDelivery {
    Sent,
    /// The send failed; the row stays pending and unclaimed.
    Failed,
    /// Another sender holds the row.
    InFlight,
}

/// What [`DeliveryDispatcher::flush`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushSummary {
    pub cadence: NotificationCadence,
    /// `true` when another flush of this cadence held the lease and this
    /// call did nothing.
    pub skipped_locked: bool,
    /// Recipients with pending rows.
    pub recipients: usize,
    /// Emails sent successfully.
    pub emails_sent: usize,
    /// Rows transitioned to sent.
    pub notifications_marked: u64,
    /// Recipients whose send failed; their rows stay pending.
    pub failed_recipients: usize,
    /// Immediate notifications skipped because another sender held them.
    pub skipped_in_flight: usize,
}

impl FlushSummary {
    fn empty(cadence: NotificationCadence) -> Self {
        Self {
            cadence,
            skipped_locked: false,
            recipients: 0,
            emails_sent: 0,
            notifications_marked: 0,
            failed_recipients: 0,
            skipped_in_flight: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryDispatcher
// ---------------------------------------------------------------------------

/// Creates notifications for new comments and delivers them.
pub struct DeliveryDispatcher {
    preferences: Arc<dyn PreferenceLookup>,
    ledger: Arc<dyn NotificationLedger>,
    gateway: Arc<dyn EmailGateway>,
    resolver: RecipientResolver,
    config: DispatchConfig,
    flush_locks: HashMap<NotificationCadence, Mutex<()>>,
}

impl DeliveryDispatcher {
    pub fn new(
        store: Arc<dyn DiscussionStore>,
        preferences: Arc<dyn PreferenceLookup>,
        ledger: Arc<dyn NotificationLedger>,
        gateway: Arc<dyn EmailGateway>,
        config: DispatchConfig,
    ) -> Self {
        let flush_locks = NotificationCadence::ALL
            .into_iter()
            .filter(|c| c.is_flushable())
            .map(|c| (c, Mutex::new(())))
            .collect();

        Self {
            resolver: RecipientResolver::new(store),
            preferences,
            ledger,
            gateway,
            config,
            flush_locks,
        }
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create notifications for a newly posted comment and send the
    /// immediate ones.
    ///
    /// Safe to re-run for the same discussion: existing rows are reported as
    /// duplicates and never re-sent here. Once every row is written the
    /// discussion is marked notified, which takes it off the
    /// reconciliation list. Fails with [`NotifyError::NotFound`] if the
    /// discussion is gone.
    pub async fn on_discussion_created(
        &self,
        discussion_id: DbId,
    ) -> Result<CreationSummary, NotifyError> {
        let (event, recipients) = self.resolver.resolve_by_id(discussion_id).await?;

        let mut summary = CreationSummary {
            discussion_id,
            recipients: recipients.len(),
            ..CreationSummary::default()
        };

        for recipient in recipients {
            let cadence = self.preferences.cadence_of(recipient.id).await?;

            match self.ledger.record(recipient.id, event.id, cadence).await? {
                RecordOutcome::Skipped => {
                    tracing::debug!(recipient_id = recipient.id, discussion_id, "Recipient opted out");
                    summary.skipped_never += 1;
                }
                RecordOutcome::Duplicate => {
                    tracing::debug!(
                        recipient_id = recipient.id,
                        discussion_id,
                        "Notification already recorded"
                    );
                    summary.duplicates += 1;
                }
                RecordOutcome::Created(entry) => {
                    summary.recorded += 1;
                    if entry.cadence == NotificationCadence::Immediate {
                        let pending = PendingNotification::from_event(&entry, recipient, &event);
                        match self.deliver_immediate(&pending).await? {
                            ImmediateDelivery::Sent => summary.sent_immediately += 1,
                            ImmediateDelivery::Failed => summary.failed_immediately += 1,
                            ImmediateDelivery::InFlight => {}
                        }
                    }
                }
            }
        }

        self.ledger.mark_discussion_notified(discussion_id).await?;

        tracing::info!(
            discussion_id,
            recipients = summary.recipients,
            recorded = summary.recorded,
            sent_immediately = summary.sent_immediately,
            failed_immediately = summary.failed_immediately,
            "Discussion notifications created"
        );

        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    /// Scheduler entry point for the hourly tick.
    pub async fn on_hourly_tick(&self) -> Result<FlushSummary, NotifyError> {
        self.flush(NotificationCadence::Hourly).await
    }

    /// Scheduler entry point for the daily tick.
    pub async fn on_daily_tick(&self) -> Result<FlushSummary, NotifyError> {
        self.flush(NotificationCadence::Daily).await
    }

    /// Send everything pending for `cadence`.
    ///
    /// `Hourly` and `Daily` send one digest per recipient. `Immediate` is a
    /// reconciliation sweep that retries each failed immediate notification
    /// with its single-comment email. `Never` is rejected.
    pub async fn flush(&self, cadence: NotificationCadence) -> Result<FlushSummary, NotifyError> {
        let local = self
            .flush_locks
            .get(&cadence)
            .ok_or(NotifyError::InvalidCadence(cadence))?;
        let _guard = local.lock().await;

        let Some(lease) = self.ledger.acquire_flush_lease(cadence).await? else {
            tracing::info!(%cadence, "Flush already running elsewhere, skipping");
            return Ok(FlushSummary {
                skipped_locked: true,
                ..FlushSummary::empty(cadence)
            });
        };

        let result = self.flush_pending(cadence).await;

        if let Err(e) = lease.release().await {
            tracing::warn!(%cadence, error = %e, "Failed to release flush lease");
        }

        let summary = result?;
        if summary.recipients > 0 {
            tracing::info!(
                %cadence,
                recipients = summary.recipients,
                emails_sent = summary.emails_sent,
                notifications_marked = summary.notifications_marked,
                failed_recipients = summary.failed_recipients,
                "Flush complete"
            );
        } else {
            tracing::debug!(%cadence, "Flush found nothing pending");
        }
        Ok(summary)
    }

    async fn flush_pending(&self, cadence: NotificationCadence) -> Result<FlushSummary, NotifyError> {
        let pending = self.ledger.unsent_by_cadence(cadence).await?;
        let mut summary = FlushSummary::empty(cadence);
        let mut ledger_error = None;

        // Ledger ordering makes each recipient's rows contiguous.
        for group in pending.chunk_by(|a, b| a.recipient.id == b.recipient.id) {
            summary.recipients += 1;
            let recipient_id = group[0].recipient.id;

            if cadence == NotificationCadence::Immediate {
                let mut all_sent = true;
                for notification in group {
                    match self.deliver_immediate(notification).await {
                        Ok(ImmediateDelivery::Sent) => {
                            summary.emails_sent += 1;
                            summary.notifications_marked += 1;
                        }
                        Ok(ImmediateDelivery::Failed) => all_sent = false,
                        Ok(ImmediateDelivery::InFlight) => summary.skipped_in_flight += 1,
                        Err(e) => {
                            tracing::error!(
                                %cadence,
                                recipient_id,
                                notification_id = notification.id,
                                error = %e,
                                "Ledger write failed during flush"
                            );
                            all_sent = false;
                            ledger_error.get_or_insert(e);
                        }
                    }
                }
                if !all_sent {
                    summary.failed_recipients += 1;
                }
            } else {
                match self.deliver_digest(group).await {
                    Ok(Some(marked)) => {
                        summary.emails_sent += 1;
                        summary.notifications_marked += marked;
                    }
                    Ok(None) => summary.failed_recipients += 1,
                    Err(e) => {
                        tracing::error!(%cadence, recipient_id, error = %e, "Ledger write failed during flush");
                        summary.emails_sent += 1;
                        summary.failed_recipients += 1;
                        ledger_error.get_or_insert(e);
                    }
                }
            }
        }

        match ledger_error {
            Some(e) => {
                tracing::warn!(
                    %cadence,
                    recipients = summary.recipients,
                    emails_sent = summary.emails_sent,
                    failed_recipients = summary.failed_recipients,
                    "Flush finished with ledger errors"
                );
                Err(e)
            }
            None => Ok(summary),
        }
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Claim one notification, send its single-comment email, and mark it
    /// sent.
    ///
    /// A failed send releases the claim and leaves the row pending for the
    /// reconciliation sweep. Errors only on ledger failure; if marking fails
    /// after the email went out, the claim expires and the row is sent again.
    async fn deliver_immediate(
        &self,
        notification: &PendingNotification,
    ) -> Result<ImmediateDelivery, NotifyError> {
        let claimed = self
            .ledger
            .claim(&[notification.id], self.config.claim_ttl())
            .await?;
        if claimed.is_empty() {
            tracing::debug!(
                notification_id = notification.id,
                recipient_id = notification.recipient.id,
                "Immediate notification held by another sender"
            );
            return Ok(ImmediateDelivery::InFlight);
        }

        let email = compose::immediate_email(notification, &self.config.frontend_url);

        if let Err(e) = self.send(&email).await {
            tracing::error!(
                notification_id = notification.id,
                recipient_id = notification.recipient.id,
                error = %e,
                "Failed to send immediate notification"
            );
            if let Err(e) = self.ledger.release_claims(&[notification.id]).await {
                tracing::warn!(
                    notification_id = notification.id,
                    error = %e,
                    "Failed to release claim, row waits for it to expire"
                );
            }
            return Ok(ImmediateDelivery::Failed);
        }

        self.ledger.mark_sent(&[notification.id], Utc::now()).await?;
        tracing::debug!(
            notification_id = notification.id,
            recipient_id = notification.recipient.id,
            "Immediate notification sent"
        );
        Ok(ImmediateDelivery::Sent)
    }

    /// Send one digest for a recipient's group and mark the whole group
    /// sent with a single shared timestamp.
    ///
    /// Returns `Ok(None)` if the send failed and nothing was marked.
    async fn deliver_digest(&self, group: &[PendingNotification]) -> Result<Option<u64>, NotifyError> {
        let Some(email) = compose::digest_email(group, &self.config.frontend_url) else {
            return Ok(Some(0));
        };
        let recipient_id = group[0].recipient.id;

        if let Err(e) = self.send(&email).await {
            tracing::error!(
                recipient_id,
                notification_count = group.len(),
                error = %e,
                "Failed to send digest"
            );
            return Ok(None);
        }

        let ids: Vec<DbId> = group.iter().map(|n| n.id).collect();
        let marked = self.ledger.mark_sent(&ids, Utc::now()).await?;
        tracing::debug!(recipient_id, marked, "Digest sent");
        Ok(Some(marked))
    }

    /// Gateway call bounded by the configured timeout.
    async fn send(&self, email: &TemplatedEmail) -> Result<(), DeliveryError> {
        let timeout = self.config.send_timeout;
        match tokio::time::timeout(timeout, self.gateway.send_templated(email)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use showcase_core::cadence::NotificationCadence::{Daily, Hourly, Immediate, Never};

    use super::*;
    use crate::delivery::EmailTemplate;
    use crate::testing::TestHarness;

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn immediate_recipient_is_emailed_and_marked_sent() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        let d1 = h.store.post(project, Some(alice), None, "Hello");

        let summary = h.dispatcher.on_discussion_created(d1).await.unwrap();

        assert_eq!(summary.recipients, 1);
        assert_eq!(summary.recorded, 1);
        assert_eq!(summary.sent_immediately, 1);

        let sent = h.gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "owner@example.com");
        assert_eq!(sent[0].template, EmailTemplate::DiscussionNotification);
        assert_eq!(sent[0].context["author_name"], "Alice Example");

        let entries = h.ledger.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].sent);
        assert!(entries[0].sent_at.is_some());
    }

    #[tokio::test]
    async fn never_recipient_gets_no_row() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Never);
        let d1 = h.store.post(project, Some(alice), None, "Hello");

        let summary = h.dispatcher.on_discussion_created(d1).await.unwrap();

        assert_eq!(summary.skipped_never, 1);
        assert!(h.ledger.entries().is_empty());
        assert!(h.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn batched_recipient_waits_for_flush() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Hourly);
        let d1 = h.store.post(project, Some(alice), None, "Hello");

        h.dispatcher.on_discussion_created(d1).await.unwrap();

        assert!(h.gateway.sent().is_empty());
        let entries = h.ledger.entries();
        assert_eq!(entries[0].cadence, Hourly);
        assert!(!entries[0].sent);
    }

    #[tokio::test]
    async fn rerun_does_not_duplicate_rows_or_emails() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        let d1 = h.store.post(project, Some(alice), None, "Hello");

        h.dispatcher.on_discussion_created(d1).await.unwrap();
        let second = h.dispatcher.on_discussion_created(d1).await.unwrap();

        assert_eq!(second.duplicates, 1);
        assert_eq!(second.recorded, 0);
        assert_eq!(h.ledger.entries().len(), 1);
        assert_eq!(h.gateway.sent().len(), 1);
    }

    #[tokio::test]
    async fn vanished_discussion_is_not_found() {
        let h = TestHarness::new();
        let err = h.dispatcher.on_discussion_created(99).await.unwrap_err();
        assert_matches!(err, NotifyError::NotFound { entity: "discussion", id: 99 });
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn failed_immediate_send_stays_pending_until_sweep() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        let d1 = h.store.post(project, Some(alice), None, "Hello");
        h.gateway.fail_for("owner@example.com");

        let summary = h.dispatcher.on_discussion_created(d1).await.unwrap();
        assert_eq!(summary.failed_immediately, 1);
        assert!(!h.ledger.entries()[0].sent);

        h.gateway.recover("owner@example.com");
        let sweep = h.dispatcher.flush(Immediate).await.unwrap();

        assert_eq!(sweep.emails_sent, 1);
        assert_eq!(sweep.notifications_marked, 1);
        assert!(h.ledger.entries()[0].sent);
        assert_eq!(h.gateway.sent().len(), 1);
    }

    #[tokio::test]
    async fn ledger_failure_propagates_as_retryable() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        let d1 = h.store.post(project, Some(alice), None, "Hello");
        h.ledger.fail_next_records(1);

        let err = h.dispatcher.on_discussion_created(d1).await.unwrap_err();
        assert_matches!(err, NotifyError::Ledger(_));
        assert!(err.is_retryable());

        let retried = h.dispatcher.on_discussion_created(d1).await.unwrap();
        assert_eq!(retried.recorded, 1);
        assert_eq!(h.gateway.sent().len(), 1);
    }

    #[tokio::test]
    async fn cadence_is_snapshotted_at_creation() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Daily);
        let d1 = h.store.post(project, Some(alice), None, "Hello");
        h.dispatcher.on_discussion_created(d1).await.unwrap();

        h.preferences.set(owner, Immediate);

        assert_eq!(h.ledger.entries()[0].cadence, Daily);
        let hourly = h.dispatcher.flush(Hourly).await.unwrap();
        assert_eq!(hourly.recipients, 0);
        let daily = h.dispatcher.flush(Daily).await.unwrap();
        assert_eq!(daily.emails_sent, 1);
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn flush_sends_one_digest_per_recipient() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let bob = h.store.add_user(3, "Bob");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Hourly);
        h.preferences.set(alice, Hourly);

        let d1 = h.store.post(project, Some(alice), None, "root");
        h.dispatcher.on_discussion_created(d1).await.unwrap();
        let r1 = h.store.post(project, Some(bob), Some(d1), "first");
        h.dispatcher.on_discussion_created(r1).await.unwrap();
        let r2 = h.store.post(project, Some(bob), Some(d1), "second");
        h.dispatcher.on_discussion_created(r2).await.unwrap();

        let summary = h.dispatcher.flush(Hourly).await.unwrap();

        // Owner: d1, r1, r2. Alice: r1, r2.
        assert_eq!(summary.recipients, 2);
        assert_eq!(summary.emails_sent, 2);
        assert_eq!(summary.notifications_marked, 5);
        assert_eq!(summary.failed_recipients, 0);

        let to_owner = h.gateway.sent_to("owner@example.com");
        assert_eq!(to_owner.len(), 1);
        assert_eq!(to_owner[0].template, EmailTemplate::DiscussionDigest);
        let comments = to_owner[0].context["groups"][0]["comments"].as_array().unwrap().clone();
        let bodies: Vec<&str> = comments.iter().map(|c| c["body"].as_str().unwrap()).collect();
        assert_eq!(bodies, vec!["root", "first", "second"]);
    }

    #[tokio::test]
    async fn digest_rows_share_one_timestamp_and_single_mark() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Daily);
        for body in ["a", "b", "c"] {
            let id = h.store.post(project, Some(alice), None, body);
            h.dispatcher.on_discussion_created(id).await.unwrap();
        }

        h.dispatcher.flush(Daily).await.unwrap();

        let entries = h.ledger.entries();
        let stamps: Vec<_> = entries.iter().map(|e| e.sent_at.unwrap()).collect();
        assert!(stamps.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(h.ledger.mark_calls(), vec![entries.iter().map(|e| e.id).collect::<Vec<_>>()]);
    }

    #[tokio::test]
    async fn flush_is_idempotent() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Hourly);
        let d1 = h.store.post(project, Some(alice), None, "Hello");
        h.dispatcher.on_discussion_created(d1).await.unwrap();

        let first = h.dispatcher.flush(Hourly).await.unwrap();
        let sent_at = h.ledger.entries()[0].sent_at;
        let second = h.dispatcher.flush(Hourly).await.unwrap();

        assert_eq!(first.emails_sent, 1);
        assert_eq!(second.emails_sent, 0);
        assert_eq!(second.recipients, 0);
        assert_eq!(h.gateway.sent().len(), 1);
        assert!(sent_at.is_some());
        assert_eq!(h.ledger.entries()[0].sent_at, sent_at);
    }

    #[tokio::test]
    async fn one_failing_recipient_does_not_block_others() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let bob = h.store.add_user(3, "Bob");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Hourly);
        h.preferences.set(alice, Hourly);
        let d1 = h.store.post(project, Some(alice), None, "root");
        h.dispatcher.on_discussion_created(d1).await.unwrap();
        let r1 = h.store.post(project, Some(bob), Some(d1), "reply");
        h.dispatcher.on_discussion_created(r1).await.unwrap();
        h.gateway.fail_for("owner@example.com");

        let summary = h.dispatcher.flush(Hourly).await.unwrap();

        assert_eq!(summary.failed_recipients, 1);
        assert_eq!(summary.emails_sent, 1);
        let entries = h.ledger.entries();
        assert!(entries.iter().filter(|e| e.recipient_id == owner).all(|e| !e.sent));
        assert!(entries.iter().filter(|e| e.recipient_id == alice).all(|e| e.sent));

        h.gateway.recover("owner@example.com");
        let retry = h.dispatcher.flush(Hourly).await.unwrap();
        assert_eq!(retry.recipients, 1);
        assert_eq!(retry.notifications_marked, 2);
    }

    #[tokio::test]
    async fn gateway_timeout_is_a_delivery_failure() {
        let h = TestHarness::with_config(DispatchConfig {
            send_timeout: Duration::from_millis(20),
            ..DispatchConfig::default()
        });
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Hourly);
        let d1 = h.store.post(project, Some(alice), None, "Hello");
        h.dispatcher.on_discussion_created(d1).await.unwrap();
        h.gateway.set_delay(Duration::from_secs(5));

        let summary = h.dispatcher.flush(Hourly).await.unwrap();

        assert_eq!(summary.failed_recipients, 1);
        assert!(!h.ledger.entries()[0].sent);
    }

    #[tokio::test]
    async fn flush_never_is_rejected() {
        let h = TestHarness::new();
        let err = h.dispatcher.flush(Never).await.unwrap_err();
        assert_matches!(err, NotifyError::InvalidCadence(Never));
    }

    #[tokio::test]
    async fn flush_skips_when_lease_is_held_elsewhere() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Hourly);
        let d1 = h.store.post(project, Some(alice), None, "Hello");
        h.dispatcher.on_discussion_created(d1).await.unwrap();
        h.ledger.hold_lease(Hourly);

        let summary = h.dispatcher.flush(Hourly).await.unwrap();

        assert!(summary.skipped_locked);
        assert!(h.gateway.sent().is_empty());
        assert!(!h.ledger.entries()[0].sent);

        h.ledger.release_lease(Hourly);
        let summary = h.dispatcher.flush(Hourly).await.unwrap();
        assert!(!summary.skipped_locked);
        assert_eq!(summary.emails_sent, 1);
        assert!(h.ledger.entries()[0].sent);
    }

    #[tokio::test]
    async fn failed_mark_does_not_stop_other_recipients() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let bob = h.store.add_user(3, "Bob");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Hourly);
        h.preferences.set(alice, Hourly);
        let d1 = h.store.post(project, Some(alice), None, "root");
        h.dispatcher.on_discussion_created(d1).await.unwrap();
        let r1 = h.store.post(project, Some(bob), Some(d1), "reply");
        h.dispatcher.on_discussion_created(r1).await.unwrap();
        h.ledger.fail_next_marks(1);

        let err = h.dispatcher.flush(Hourly).await.unwrap_err();

        assert_matches!(err, NotifyError::Ledger(_));
        assert_eq!(h.gateway.sent().len(), 2);
        let entries = h.ledger.entries();
        assert!(entries.iter().filter(|e| e.recipient_id == owner).all(|e| !e.sent));
        assert!(entries.iter().filter(|e| e.recipient_id == alice).all(|e| e.sent));
    }

    #[tokio::test]
    async fn sweep_skips_notification_still_being_sent_inline() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        let d1 = h.store.post(project, Some(alice), None, "Hello");
        h.gateway.set_delay(Duration::from_millis(50));

        let dispatcher = Arc::clone(&h.dispatcher);
        let inline = tokio::spawn(async move { dispatcher.on_discussion_created(d1).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let sweep = h.dispatcher.flush(Immediate).await.unwrap();
        let created = inline.await.unwrap().unwrap();

        assert_eq!(sweep.emails_sent, 0);
        assert_eq!(sweep.skipped_in_flight, 1);
        assert_eq!(created.sent_immediately, 1);
        assert_eq!(h.gateway.sent().len(), 1);
        assert!(h.ledger.entries()[0].sent);
    }

    #[tokio::test]
    async fn failed_inline_send_releases_its_claim() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        let d1 = h.store.post(project, Some(alice), None, "Hello");
        h.gateway.fail_for("owner@example.com");
        h.dispatcher.on_discussion_created(d1).await.unwrap();

        let id = h.ledger.entries()[0].id;
        let claimed = h.ledger.claim(&[id], Duration::from_secs(60)).await.unwrap();
        assert_eq!(claimed, vec![id]);
    }

    #[tokio::test]
    async fn creation_marks_discussion_notified() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        let d1 = h.store.post(project, Some(alice), None, "Hello");
        h.ledger.fail_next_records(1);

        h.dispatcher.on_discussion_created(d1).await.unwrap_err();
        assert!(!h.ledger.is_notified(d1));

        h.dispatcher.on_discussion_created(d1).await.unwrap();
        assert!(h.ledger.is_notified(d1));
    }

    #[tokio::test]
    async fn concurrent_flushes_of_one_cadence_send_once() {
        let h = TestHarness::new();
        let owner = h.store.add_user(1, "Owner");
        let alice = h.store.add_user(2, "Alice");
        let project = h.store.add_project(10, "Harbour walk", Some(owner));
        h.preferences.set(owner, Hourly);
        let d1 = h.store.post(project, Some(alice), None, "Hello");
        h.dispatcher.on_discussion_created(d1).await.unwrap();
        h.gateway.set_delay(Duration::from_millis(20));

        let (a, b) = tokio::join!(h.dispatcher.flush(Hourly), h.dispatcher.flush(Hourly));

        let total = a.unwrap().emails_sent + b.unwrap().emails_sent;
        assert_eq!(total, 1);
        assert_eq!(h.gateway.sent().len(), 1);
    }
}
