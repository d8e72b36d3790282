use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pagination::Paginatable;

/// Represents one authenticated device or client.
///
/// Issued tokens carry the session id as their subject, never the user id,
/// so a single device can be revoked without touching the user's other
/// sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The unique identifier for the session.
    pub id: Uuid,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The user agent reported at login.
    pub user_agent: String,
    /// The client IP observed at login.
    pub ip_address: String,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp of the last verified call made with this session.
    pub updated_at: DateTime<Utc>,
}

/// The fields supplied by the caller when opening a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub user_agent: String,
    pub ip_address: String,
}

impl Paginatable for Session {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
