use std::sync::Arc;
use crate::config::Config;
use crate::crypto::{password::decoy_hash, token::TokenService};
use crate::error::{AppError, Result};
use crate::middleware_layer::{
    auth::{AuthorizationStage, BypassList},
    pipeline::{ConnectInfoPeer, PeerResolver, Pipeline},
    rate_limit::RateLimiterStage,
};
use crate::repositories::{
    session::{PgSessionRepository, SessionRepository},
    user::{PgUserRepository, UserRepository},
};
use crate::services::sessions::SessionStore;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// Issues and verifies session tokens.
    pub tokens: TokenService,
    /// Session lifecycle.
    pub sessions: SessionStore,
    /// Account lookups for login and password changes.
    pub users: Arc<dyn UserRepository>,
    /// The per-client rate limiter, shared with its sweeper task.
    pub rate_limiter: Arc<RateLimiterStage>,
    /// The admission pipeline run in front of every handler.
    pub pipeline: Arc<Pipeline>,
    /// Resolves the transport peer of a request.
    pub peers: Arc<dyn PeerResolver>,
    /// Hash verified against when a login names an unknown account.
    pub login_decoy: Arc<str>,
}

impl AppState {
    /// Creates a new `AppState` backed by PostgreSQL.
    ///
    /// # Arguments
    ///
    /// * `config` - The validated application configuration.
    ///
    /// # Returns
    ///
    /// A `Result<Self>`; fails when the pool cannot be built.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL pool initialized");

        Self::with_repositories(
            config,
            Arc::new(PgSessionRepository::new(db.clone())),
            Arc::new(PgUserRepository::new(db)),
        )
    }

    /// Assembles the state around the given repositories.
    pub fn with_repositories(
        config: &Config,
        session_repo: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Result<Self> {
        let access_ttl = config
            .access_token_ttl()
            .ok_or_else(|| AppError::Internal("access token TTL out of range".to_string()))?;
        let refresh_ttl = config
            .refresh_token_ttl()
            .ok_or_else(|| AppError::Internal("refresh token TTL out of range".to_string()))?;
        let tokens = TokenService::new(&config.jwt_secret, access_ttl, refresh_ttl);
        let sessions = SessionStore::new(session_repo);

        let rate_limiter = Arc::new(RateLimiterStage::new(
            config.rate_limit_per_second,
            config.rate_limit_burst,
        )?);
        let authorization = Arc::new(AuthorizationStage::new(
            tokens.clone(),
            sessions.clone(),
            BypassList::standard(),
        ));

        let pipeline = Pipeline::new()
            .then(rate_limiter.clone())
            .then(authorization);
        tracing::info!(stages = ?pipeline.stage_names(), "✅ Admission pipeline assembled");

        let login_decoy: Arc<str> = Arc::from(decoy_hash()?);

        Ok(AppState {
            tokens,
            sessions,
            users,
            rate_limiter,
            pipeline: Arc::new(pipeline),
            peers: Arc::new(ConnectInfoPeer),
            login_decoy,
        })
    }
}
