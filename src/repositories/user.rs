use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::user::User,
};

/// Read access to accounts, plus the one write the session endpoints need.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds a user by their email address.
    ///
    /// # Arguments
    ///
    /// * `email` - The email address given at login.
    ///
    /// # Returns
    ///
    /// A `Result<Option<User>>` that is `None` when no account matches.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Finds a user by their ID.
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Replaces a user's password hash.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The ID of the user.
    /// * `password_hash` - The new PHC-encoded Argon2 hash.
    ///
    /// # Returns
    ///
    /// A `Result<()>` indicating whether the update succeeded.
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()>;
}

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        email: row.try_get("email").map_err(|_| AppError::MissingData("email".to_string()))?,
        password_hash: row.try_get("password").map_err(|_| AppError::MissingData("password".to_string()))?,
        is_verified: row.try_get("is_verified").map_err(|_| AppError::MissingData("is_verified".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
    })
}

/// Users stored in the `users` table.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool,
}

impl PgUserRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, email, password, is_verified, created_at
                FROM users
                WHERE email = $1
                "#,
                &[&email],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, email, password, is_verified, created_at
                FROM users
                WHERE id = $1
                "#,
                &[&user_id],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE users
                SET password = $1, updated_at = NOW()
                WHERE id = $2
                "#,
                &[&password_hash, &user_id],
            )
            .await?;
        Ok(())
    }
}
