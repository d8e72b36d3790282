use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The slice of a user account read by the session endpoints.
#[derive(Clone, Debug)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's email address.
    pub email: String,
    /// The user's Argon2 password hash in PHC format.
    pub password_hash: String,
    /// Whether the user confirmed their email address.
    pub is_verified: bool,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}
