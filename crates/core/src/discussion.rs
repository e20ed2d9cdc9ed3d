//! Discussion threads as seen by the notification engine.
//!
//! Threads are two-level: a root discussion (no parent) and its direct
//! replies. Replying to a reply is flattened onto the root at creation time
//! (see [`thread_parent`]), so every non-root discussion has a root parent.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::{DbId, Timestamp};

/// Fallback author name when the author account has been deleted.
pub const UNKNOWN_AUTHOR_NAME: &str = "Someone";

/// Fallback greeting when the recipient has no first name.
pub const DEFAULT_GREETING_NAME: &str = "there";

/// Maximum accepted comment length, in characters.
pub const MAX_BODY_CHARS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A user account referenced by a discussion (owner, author, recipient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: DbId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl Participant {
    /// `"First Last"`, or `None` when both parts are blank.
    pub fn full_name(&self) -> Option<String> {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        (!full.is_empty()).then(|| full.to_string())
    }

    /// Name shown as the author of a comment: full name, else email.
    pub fn display_name(&self) -> String {
        self.full_name().unwrap_or_else(|| self.email.clone())
    }

    /// Name used in the greeting line of an email.
    pub fn greeting_name(&self) -> &str {
        let first = self.first_name.trim();
        if first.is_empty() {
            DEFAULT_GREETING_NAME
        } else {
            first
        }
    }
}

/// Author display name for a possibly-deleted author.
pub fn author_display_name(author: Option<&Participant>) -> String {
    author
        .map(Participant::display_name)
        .unwrap_or_else(|| UNKNOWN_AUTHOR_NAME.to_string())
}

// ---------------------------------------------------------------------------
// DiscussionEvent
// ---------------------------------------------------------------------------

/// A fully-loaded discussion: the comment plus the people around it.
///
/// Loaded with the project owner, the author, and (for replies) the parent's
/// author so that recipient resolution needs no further lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionEvent {
    pub id: DbId,
    pub project_id: DbId,
    pub project_title: String,
    pub project_owner: Option<Participant>,
    pub author: Option<Participant>,
    pub parent_id: Option<DbId>,
    pub parent_author: Option<Participant>,
    pub body: String,
    pub created_at: Timestamp,
}

impl DiscussionEvent {
    /// Id of the thread root: the parent for a reply, the event itself otherwise.
    pub fn root_id(&self) -> DbId {
        self.parent_id.unwrap_or(self.id)
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn author_id(&self) -> Option<DbId> {
        self.author.as_ref().map(|a| a.id)
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Input for posting a new comment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewDiscussion {
    pub project_id: DbId,
    pub author_id: DbId,
    #[validate(length(min = 1, max = 10000))]
    pub body: String,
    pub parent_id: Option<DbId>,
}

/// The parent row a reply points at, as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    pub id: DbId,
    pub project_id: DbId,
    pub parent_id: Option<DbId>,
}

/// Where a new reply actually lands: `(parent_id, project_id)`.
///
/// A reply to a reply is re-parented onto the thread root, and the reply
/// always inherits the parent's project.
pub fn thread_parent(parent: ParentRef) -> (DbId, DbId) {
    (parent.parent_id.unwrap_or(parent.id), parent.project_id)
}
