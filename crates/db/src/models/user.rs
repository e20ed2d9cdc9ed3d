//! User entity model and DTOs.

use serde::{Deserialize, Serialize};
use showcase_core::discussion::Participant;
use showcase_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub notification_frequency: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<User> for Participant {
    fn from(user: User) -> Self {
        Participant {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

/// DTO for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Defaults to `immediate` if omitted.
    pub notification_frequency: Option<String>,
}
