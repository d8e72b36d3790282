use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::{types::ToSql, Row};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::{NewSession, Session},
    pagination::{paginate, Page, PageRequest, PgKeyset},
};

/// Persistence of logged-in clients.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Stores a new session under a fresh id.
    async fn create(&self, new: NewSession) -> Result<Session>;

    /// Loads a session.
    ///
    /// # Arguments
    ///
    /// * `id` - The session ID carried as a token's subject.
    ///
    /// # Returns
    ///
    /// A `Result<Option<Session>>` that is `None` once the session has been
    /// revoked or reaped.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Session>>;

    /// Advances `updated_at` to now.
    async fn touch(&self, id: Uuid) -> Result<()>;

    /// Deletes one session. Deleting a missing session is not an error.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Deletes every session of a user, returning how many were removed.
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64>;

    /// Deletes sessions last touched before `cutoff`.
    ///
    /// # Arguments
    ///
    /// * `cutoff` - Sessions with `updated_at` strictly older are removed.
    ///
    /// # Returns
    ///
    /// A `Result<u64>` with the number of sessions deleted.
    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// One page of a user's sessions, newest first.
    async fn list_for_user(&self, user_id: Uuid, page: &PageRequest) -> Result<Page<Session>>;
}

const SESSION_COLUMNS: &str = "id, user_id, user_agent, ip_address, created_at, updated_at";

/// A helper function to map a `tokio_postgres::Row` to a `Session`.
fn row_to_session(row: &Row) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        user_id: row.try_get("user_id").map_err(|_| AppError::MissingData("user_id".to_string()))?,
        user_agent: row.try_get("user_agent").map_err(|_| AppError::MissingData("user_agent".to_string()))?,
        ip_address: row.try_get("ip_address").map_err(|_| AppError::MissingData("ip_address".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|_| AppError::MissingData("updated_at".to_string()))?,
    })
}

/// Sessions stored in the `sessions` table.
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: Pool,
}

impl PgSessionRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, new: NewSession) -> Result<Session> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                INSERT INTO sessions (id, user_id, user_agent, ip_address, created_at, updated_at)
                VALUES ($1, $2, $3, $4, NOW(), NOW())
                RETURNING id, user_id, user_agent, ip_address, created_at, updated_at
                "#,
                &[&Uuid::new_v4(), &new.user_id, &new.user_agent, &new.ip_address],
            )
            .await?;
        row_to_session(&row)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, user_id, user_agent, ip_address, created_at, updated_at
                FROM sessions
                WHERE id = $1
                "#,
                &[&id],
            )
            .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn touch(&self, id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute("UPDATE sessions SET updated_at = NOW() WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute("DELETE FROM sessions WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let client = self.pool.get().await?;
        let removed = client
            .execute("DELETE FROM sessions WHERE user_id = $1", &[&user_id])
            .await?;
        Ok(removed)
    }

    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let client = self.pool.get().await?;
        let removed = client
            .execute("DELETE FROM sessions WHERE updated_at < $1", &[&cutoff])
            .await?;
        Ok(removed)
    }

    async fn list_for_user(&self, user_id: Uuid, page: &PageRequest) -> Result<Page<Session>> {
        let source = PgKeyset::new(&self.pool, "sessions", SESSION_COLUMNS, row_to_session)
            .filter("user_id = $1", vec![Box::new(user_id) as Box<dyn ToSql + Sync + Send>]);
        paginate(&source, page).await
    }
}
