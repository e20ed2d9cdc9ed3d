//! Discussion entity model, DTOs, and the joined event row.

use serde::{Deserialize, Serialize};
use showcase_core::discussion::DiscussionEvent;
use showcase_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use super::joined_participant;

/// A row from the `discussions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Discussion {
    pub id: DbId,
    pub project_id: DbId,
    pub author_id: Option<DbId>,
    pub parent_id: Option<DbId>,
    pub body: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a discussion. Threading rules are applied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDiscussion {
    pub project_id: DbId,
    pub author_id: Option<DbId>,
    pub parent_id: Option<DbId>,
    pub body: String,
}

/// A discussion joined with its project, owner, author, and parent author.
///
/// Every user column comes from a LEFT JOIN and is therefore nullable.
#[derive(Debug, Clone, FromRow)]
pub struct DiscussionEventRow {
    pub id: DbId,
    pub project_id: DbId,
    pub project_title: String,
    pub owner_id: Option<DbId>,
    pub owner_email: Option<String>,
    pub owner_first_name: Option<String>,
    pub owner_last_name: Option<String>,
    pub author_id: Option<DbId>,
    pub author_email: Option<String>,
    pub author_first_name: Option<String>,
    pub author_last_name: Option<String>,
    pub parent_id: Option<DbId>,
    pub parent_author_id: Option<DbId>,
    pub parent_author_email: Option<String>,
    pub parent_author_first_name: Option<String>,
    pub parent_author_last_name: Option<String>,
    pub body: String,
    pub created_at: Timestamp,
}

impl From<DiscussionEventRow> for DiscussionEvent {
    fn from(row: DiscussionEventRow) -> Self {
        DiscussionEvent {
            id: row.id,
            project_id: row.project_id,
            project_title: row.project_title,
            project_owner: joined_participant(
                row.owner_id,
                row.owner_email,
                row.owner_first_name,
                row.owner_last_name,
            ),
            author: joined_participant(
                row.author_id,
                row.author_email,
                row.author_first_name,
                row.author_last_name,
            ),
            parent_id: row.parent_id,
            parent_author: joined_participant(
                row.parent_author_id,
                row.parent_author_email,
                row.parent_author_first_name,
                row.parent_author_last_name,
            ),
            body: row.body,
            created_at: row.created_at,
        }
    }
}
