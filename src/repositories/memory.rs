//! In-process repositories backed by locked maps.
//!
//! They follow the same contracts as the PostgreSQL repositories and back
//! the end-to-end tests and local runs without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        session::{NewSession, Session},
        user::User,
    },
    pagination::{paginate, MemoryKeyset, Page, PageRequest},
    repositories::{session::SessionRepository, user::UserRepository},
};

#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session verbatim, keeping its timestamps.
    pub async fn insert(&self, session: Session) {
        self.sessions.write().await.insert(session.id, session);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, new: NewSession) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            user_agent: new.user_agent,
            ip_address: new.ip_address,
            created_at: now,
            updated_at: now,
        };
        self.sessions.write().await.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn touch(&self, id: Uuid) -> Result<()> {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.sessions.write().await.remove(&id);
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.updated_at >= cutoff);
        Ok((before - sessions.len()) as u64)
    }

    async fn list_for_user(&self, user_id: Uuid, page: &PageRequest) -> Result<Page<Session>> {
        let snapshot: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        let source = MemoryKeyset::new(snapshot, move |s: &Session| s.user_id == user_id);
        paginate(&source, page).await
    }
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }
}
