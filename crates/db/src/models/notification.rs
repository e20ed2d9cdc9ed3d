//! Notification ledger models.

use serde::Serialize;
use showcase_core::discussion::Participant;
use showcase_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use super::joined_participant;

/// A row from the `notifications` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: DbId,
    pub recipient_id: DbId,
    pub discussion_id: DbId,
    pub cadence: String,
    pub sent: bool,
    pub created_at: Timestamp,
    pub sent_at: Option<Timestamp>,
}

/// An unsent notification joined with everything needed to email it.
#[derive(Debug, Clone, FromRow)]
pub struct PendingNotificationRow {
    pub id: DbId,
    pub cadence: String,
    pub created_at: Timestamp,
    pub recipient_id: DbId,
    pub recipient_email: String,
    pub recipient_first_name: String,
    pub recipient_last_name: String,
    pub discussion_id: DbId,
    pub project_id: DbId,
    pub project_title: String,
    pub body: String,
    pub author_id: Option<DbId>,
    pub author_email: Option<String>,
    pub author_first_name: Option<String>,
    pub author_last_name: Option<String>,
}

impl PendingNotificationRow {
    pub fn recipient(&self) -> Participant {
        Participant {
            id: self.recipient_id,
            email: self.recipient_email.clone(),
            first_name: self.recipient_first_name.clone(),
            last_name: self.recipient_last_name.clone(),
        }
    }

    pub fn author(&self) -> Option<Participant> {
        joined_participant(
            self.author_id,
            self.author_email.clone(),
            self.author_first_name.clone(),
            self.author_last_name.clone(),
        )
    }
}
