//! Request-path entry points for discussions and notification preferences.
//!
//! [`DiscussionService`] validates and persists comments, applies the
//! two-level threading rule, and hands notification work to the queue
//! without waiting for it to run.

use showcase_core::cadence::NotificationCadence;
use showcase_core::discussion::{thread_parent, NewDiscussion, ParentRef};
use showcase_core::error::CoreError;
use showcase_core::types::DbId;
use showcase_db::models::discussion::{CreateDiscussion, Discussion};
use showcase_db::repositories::{DiscussionRepo, ProjectRepo, UserRepo};
use showcase_db::DbPool;
use validator::Validate;

use crate::queue::NotificationQueue;

/// Errors surfaced to callers of [`DiscussionService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn not_found(entity: &'static str, id: DbId) -> ServiceError {
    CoreError::NotFound { entity, id }.into()
}

/// Posts and deletes comments; updates notification preferences.
#[derive(Clone)]
pub struct DiscussionService {
    pool: DbPool,
    queue: Option<NotificationQueue>,
}

impl DiscussionService {
    /// A service that only persists. Notification work is then fed by the
    /// database's `discussion_created` channel.
    pub fn new(pool: DbPool) -> Self {
        Self { pool, queue: None }
    }

    /// Also enqueue notification work directly after each insert.
    pub fn with_queue(mut self, queue: NotificationQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Post a comment.
    ///
    /// A reply lands on the parent's project, and a reply to a reply is
    /// attached to the thread root. Notification creation is queued and
    /// never fails the post; a full queue delays it by at most the enqueue
    /// timeout, after which reconciliation picks the discussion up.
    pub async fn create_discussion(&self, input: NewDiscussion) -> Result<Discussion, ServiceError> {
        input
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        UserRepo::find_by_id(&self.pool, input.author_id)
            .await?
            .ok_or_else(|| not_found("user", input.author_id))?;

        let (parent_id, project_id) = match input.parent_id {
            Some(pid) => {
                let parent = DiscussionRepo::find_by_id(&self.pool, pid)
                    .await?
                    .ok_or_else(|| not_found("discussion", pid))?;
                let (root, project) = thread_parent(ParentRef {
                    id: parent.id,
                    project_id: parent.project_id,
                    parent_id: parent.parent_id,
                });
                (Some(root), project)
            }
            None => {
                ProjectRepo::find_by_id(&self.pool, input.project_id)
                    .await?
                    .ok_or_else(|| not_found("project", input.project_id))?;
                (None, input.project_id)
            }
        };

        let discussion = DiscussionRepo::create(
            &self.pool,
            &CreateDiscussion {
                project_id,
                author_id: Some(input.author_id),
                parent_id,
                body: input.body,
            },
        )
        .await?;

        tracing::info!(
            discussion_id = discussion.id,
            project_id,
            parent_id = ?discussion.parent_id,
            "Discussion created"
        );

        if let Some(queue) = &self.queue {
            if let Err(e) = queue.enqueue(discussion.id).await {
                tracing::warn!(
                    discussion_id = discussion.id,
                    error = %e,
                    "Failed to enqueue discussion notifications"
                );
            }
        }

        Ok(discussion)
    }

    /// Delete a comment. Only its author may do so; replies go with it.
    pub async fn delete_discussion(&self, id: DbId, requesting_user: DbId) -> Result<(), ServiceError> {
        let discussion = DiscussionRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| not_found("discussion", id))?;

        if discussion.author_id != Some(requesting_user) {
            return Err(CoreError::Forbidden("Only the author can delete a discussion".into()).into());
        }

        if !DiscussionRepo::delete(&self.pool, id).await? {
            return Err(not_found("discussion", id));
        }

        tracing::info!(discussion_id = id, user_id = requesting_user, "Discussion deleted");
        Ok(())
    }

    /// Change how a user wants to be notified from now on.
    ///
    /// Notifications already recorded keep their cadence.
    pub async fn set_notification_cadence(
        &self,
        user_id: DbId,
        cadence: NotificationCadence,
    ) -> Result<(), ServiceError> {
        if !UserRepo::update_notification_frequency(&self.pool, user_id, cadence.as_str()).await? {
            return Err(not_found("user", user_id));
        }
        tracing::info!(user_id, %cadence, "Notification cadence updated");
        Ok(())
    }
}
