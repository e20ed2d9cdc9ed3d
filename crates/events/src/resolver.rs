//! Recipient resolution for new discussion comments.
//!
//! [`RecipientResolver`] loads the thread around a comment from the
//! [`DiscussionStore`] and applies the pure recipient-set rules from
//! [`showcase_core::recipients`]. It has no side effects.

use std::sync::Arc;

use showcase_core::discussion::DiscussionEvent;
use showcase_core::recipients::{resolve_recipients, RecipientSet};
use showcase_core::types::DbId;

use crate::error::NotifyError;
use crate::store::DiscussionStore;

/// Computes the deduplicated set of users to notify about a comment.
#[derive(Clone)]
pub struct RecipientResolver {
    store: Arc<dyn DiscussionStore>,
}

impl RecipientResolver {
    pub fn new(store: Arc<dyn DiscussionStore>) -> Self {
        Self { store }
    }

    /// Recipients for an already-loaded event.
    pub async fn resolve(&self, event: &DiscussionEvent) -> Result<RecipientSet, NotifyError> {
        let replies = self.store.list_replies_of(event.root_id()).await?;
        Ok(resolve_recipients(event, &replies))
    }

    /// Load the event by id, then resolve its recipients.
    ///
    /// Fails with [`NotifyError::NotFound`] if the discussion is gone.
    pub async fn resolve_by_id(
        &self,
        discussion_id: DbId,
    ) -> Result<(DiscussionEvent, RecipientSet), NotifyError> {
        let event = self
            .store
            .get_event_by_id(discussion_id)
            .await?
            .ok_or_else(|| NotifyError::not_found("discussion", discussion_id))?;

        let recipients = self.resolve(&event).await?;
        Ok((event, recipients))
    }
}
