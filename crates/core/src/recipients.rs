//! Recipient-set algebra for new discussion comments.
//!
//! Given a comment and the replies already in its thread, the recipients are:
//!
//! 1. the project owner,
//! 2. the root discussion's author (only when the comment is a reply),
//! 3. every distinct author of a reply under the same root,
//!
//! minus the comment's own author. A user reached by several rules appears
//! once.

use std::collections::BTreeMap;

use crate::discussion::{DiscussionEvent, Participant};
use crate::types::DbId;

/// Deduplicated set of users to notify, keyed and ordered by user id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientSet {
    members: BTreeMap<DbId, Participant>,
}

impl RecipientSet {
    fn insert(&mut self, participant: &Participant) {
        self.members
            .entry(participant.id)
            .or_insert_with(|| participant.clone());
    }

    fn remove(&mut self, id: DbId) {
        self.members.remove(&id);
    }

    pub fn contains(&self, id: DbId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Recipient ids in ascending order.
    pub fn ids(&self) -> Vec<DbId> {
        self.members.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.members.values()
    }
}

impl IntoIterator for RecipientSet {
    type Item = Participant;
    type IntoIter = std::collections::btree_map::IntoValues<DbId, Participant>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_values()
    }
}

/// Compute who should hear about `event`.
///
/// `thread_replies` are the discussions whose parent is the event's root. It
/// may include the event itself; the final self-exclusion removes it.
pub fn resolve_recipients(
    event: &DiscussionEvent,
    thread_replies: &[DiscussionEvent],
) -> RecipientSet {
    let mut set = RecipientSet::default();

    if let Some(owner) = &event.project_owner {
        set.insert(owner);
    }

    if event.is_reply() {
        if let Some(root_author) = &event.parent_author {
            set.insert(root_author);
        }
    }

    let root_id = event.root_id();
    thread_replies
        .iter()
        .filter(|reply| reply.parent_id == Some(root_id))
        .filter_map(|reply| reply.author.as_ref())
        .for_each(|author| set.insert(author));

    if let Some(author_id) = event.author_id() {
        set.remove(author_id);
    }

    set
}
