//! Builds the emails the dispatcher hands to the gateway.

use chrono::{Datelike, Utc};
use serde_json::json;
use showcase_core::digest::{group_by_project, truncate_body, DigestEntry};
use showcase_core::discussion::author_display_name;
use showcase_core::types::DbId;

use crate::delivery::{EmailTemplate, TemplatedEmail};
use crate::ledger::PendingNotification;

/// Subject line for digest emails.
pub const DIGEST_SUBJECT: &str = "Discussion updates";

/// Link to a project's discussion page.
pub fn discussion_url(frontend_url: &str, project_id: DbId) -> String {
    format!("{frontend_url}/projects/{project_id}/discussions")
}

/// Single-comment email for one notification.
pub fn immediate_email(notification: &PendingNotification, frontend_url: &str) -> TemplatedEmail {
    TemplatedEmail {
        to: notification.recipient.email.clone(),
        subject: format!("New comment on {}", notification.project_title),
        template: EmailTemplate::DiscussionNotification,
        context: json!({
            "recipient_name": notification.recipient.greeting_name(),
            "author_name": author_display_name(notification.author.as_ref()),
            "project_title": notification.project_title,
            "comment_body": truncate_body(&notification.body),
            "discussion_url": discussion_url(frontend_url, notification.project_id),
            "current_year": Utc::now().year(),
        }),
    }
}

/// Digest email bundling one recipient's pending notifications.
///
/// `group` must be non-empty and belong to a single recipient.
pub fn digest_email(group: &[PendingNotification], frontend_url: &str) -> Option<TemplatedEmail> {
    let recipient = &group.first()?.recipient;

    let groups = group_by_project(group.iter().map(|n| DigestEntry {
        project_id: n.project_id,
        project_title: &n.project_title,
        author: n.author.as_ref(),
        body: &n.body,
    }));

    Some(TemplatedEmail {
        to: recipient.email.clone(),
        subject: DIGEST_SUBJECT.to_string(),
        template: EmailTemplate::DiscussionDigest,
        context: json!({
            "recipient_name": recipient.greeting_name(),
            "groups": groups,
            "notification_count": group.len(),
            "site_url": frontend_url,
            "current_year": Utc::now().year(),
        }),
    })
}
