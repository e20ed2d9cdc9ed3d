//! Email content shaping for discussion notifications.
//!
//! Pure helpers shared by the immediate and digest email paths: comment
//! truncation and grouping of a recipient's pending comments by project.

use serde::Serialize;

use crate::discussion::{author_display_name, Participant};
use crate::types::DbId;

/// Maximum number of characters of a comment body included in an email.
pub const MAX_EMAIL_BODY_CHARS: usize = 500;

/// Truncate a comment body to [`MAX_EMAIL_BODY_CHARS`] characters.
///
/// Counts `char`s, not bytes, so multi-byte text is never split mid-character.
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_EMAIL_BODY_CHARS) {
        Some((cut, _)) => body[..cut].to_string(),
        None => body.to_string(),
    }
}

/// One pending comment going into a digest.
#[derive(Debug, Clone, Copy)]
pub struct DigestEntry<'a> {
    pub project_id: DbId,
    pub project_title: &'a str,
    pub author: Option<&'a Participant>,
    pub body: &'a str,
}

/// A comment line in the digest email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestComment {
    pub author_name: String,
    pub body: String,
}

/// All comments from one project in the digest email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestGroup {
    pub project_id: DbId,
    pub project_title: String,
    pub comments: Vec<DigestComment>,
}

/// Group entries by project, keeping projects in first-seen order and
/// comments in input order.
pub fn group_by_project<'a>(entries: impl IntoIterator<Item = DigestEntry<'a>>) -> Vec<DigestGroup> {
    let mut groups: Vec<DigestGroup> = Vec::new();

    for entry in entries {
        let comment = DigestComment {
            author_name: author_display_name(entry.author),
            body: truncate_body(entry.body),
        };

        match groups.iter_mut().find(|g| g.project_id == entry.project_id) {
            Some(group) => group.comments.push(comment),
            None => groups.push(DigestGroup {
                project_id: entry.project_id,
                project_title: entry.project_title.to_string(),
                comments: vec![comment],
            }),
        }
    }

    groups
}
