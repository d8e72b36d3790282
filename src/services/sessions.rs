use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    error::Result,
    models::session::{NewSession, Session},
    pagination::{Page, PageRequest},
    repositories::session::SessionRepository,
};

/// Lifecycle of logged-in clients on top of a [`SessionRepository`].
///
/// Signature and expiry checks on a token say nothing about whether its
/// session still exists; revocation only holds because every authorized
/// call goes through [`SessionStore::get`].
#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, new: NewSession) -> Result<Session> {
        let session = self.repo.create(new).await?;
        tracing::info!(session_id = %session.id, user_id = %session.user_id, "session created");
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        self.repo.get_by_id(id).await
    }

    /// Slides the session's freshness forward.
    pub async fn touch(&self, session: &Session) -> Result<()> {
        self.repo.touch(session.id).await
    }

    pub async fn revoke(&self, id: Uuid) -> Result<()> {
        self.repo.delete(id).await?;
        tracing::info!(session_id = %id, "session revoked");
        Ok(())
    }

    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let removed = self.repo.delete_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, removed, "all sessions revoked");
        Ok(removed)
    }

    pub async fn list_for_user(&self, user_id: Uuid, page: &PageRequest) -> Result<Page<Session>> {
        self.repo.list_for_user(user_id, page).await
    }

    /// Deletes sessions untouched for longer than `idle_threshold`.
    ///
    /// # Arguments
    ///
    /// * `idle_threshold` - How long a session may go without a verified call.
    ///
    /// # Returns
    ///
    /// A `Result<u64>` with the number of sessions reaped.
    pub async fn reap_idle(&self, idle_threshold: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - idle_threshold;
        let removed = self.repo.delete_idle_since(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, %cutoff, "idle sessions reaped");
        } else {
            tracing::debug!(%cutoff, "no idle sessions to reap");
        }
        Ok(removed)
    }

    /// Runs [`SessionStore::reap_idle`] every `every` until the task is aborted.
    pub fn spawn_reaper(&self, every: Duration, idle_threshold: chrono::Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = store.reap_idle(idle_threshold).await {
                    tracing::error!("Session reaper failed: {}", e);
                }
            }
        })
    }
}
