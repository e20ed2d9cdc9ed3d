//! Row models and DTOs.
//!
//! Each submodule contains a `FromRow` entity struct matching the database
//! row and, where rows are inserted by this crate, a `Deserialize` create DTO.

pub mod discussion;
pub mod notification;
pub mod project;
pub mod user;

use showcase_core::discussion::Participant;
use showcase_core::types::DbId;

/// Build a [`Participant`] from LEFT JOINed user columns.
///
/// Returns `None` when the join found no user (deleted author, ownerless
/// project).
pub(crate) fn joined_participant(
    id: Option<DbId>,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
) -> Option<Participant> {
    Some(Participant {
        id: id?,
        email: email.unwrap_or_default(),
        first_name: first_name.unwrap_or_default(),
        last_name: last_name.unwrap_or_default(),
    })
}
