//! Read-side capabilities consumed by the notification engine.

use async_trait::async_trait;
use showcase_core::cadence::NotificationCadence;
use showcase_core::discussion::DiscussionEvent;
use showcase_core::types::DbId;

use crate::error::NotifyError;

/// Discussion persistence, as far as notifications are concerned.
#[async_trait]
pub trait DiscussionStore: Send + Sync {
    /// Load a discussion with owner, author, and parent author.
    ///
    /// Returns `Ok(None)` when the discussion no longer exists.
    async fn get_event_by_id(&self, id: DbId) -> Result<Option<DiscussionEvent>, NotifyError>;

    /// Direct replies of a root discussion, oldest first.
    async fn list_replies_of(&self, root_id: DbId) -> Result<Vec<DiscussionEvent>, NotifyError>;
}

/// Current notification preference of a user.
///
/// Read once, when notifications are created.
#[async_trait]
pub trait PreferenceLookup: Send + Sync {
    /// The user's cadence. Users that no longer exist report `Never`.
    async fn cadence_of(&self, user_id: DbId) -> Result<NotificationCadence, NotifyError>;
}
