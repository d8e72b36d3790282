use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use tokio_postgres::NoTls;
use crate::error::{AppError, Result};
use std::time::Duration;

/// Connections kept by the pool. Every authenticated call performs one read
/// and one write against the sessions table, so this bounds in-flight calls.
const MAX_POOL_SIZE: usize = 64;

/// Creates the PostgreSQL connection pool from a connection URL.
///
/// # Arguments
///
/// * `database_url` - A `postgres://` URL or key/value connection string.
///
/// # Returns
///
/// A `Result<Pool>`; connections are opened lazily on first use.
pub fn create_pool(database_url: &str) -> Result<Pool> {
    let pg_config: tokio_postgres::Config = database_url.parse()?;

    let mut cfg = Config::new();
    if let Some(tokio_postgres::config::Host::Tcp(hostname)) = pg_config.get_hosts().first() {
        cfg.host = Some(hostname.clone());
    }
    cfg.port = pg_config.get_ports().first().copied();
    cfg.dbname = pg_config.get_dbname().map(str::to_string);
    cfg.user = pg_config.get_user().map(str::to_string);
    cfg.password = pg_config
        .get_password()
        .map(|password| String::from_utf8_lossy(password).to_string());

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    // No create/recycle retries here: a slow store blocks the caller only up
    // to its own deadline.
    cfg.pool = Some(PoolConfig {
        max_size: MAX_POOL_SIZE,
        timeouts: Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(2)),
            recycle: Some(Duration::from_secs(1)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(AppError::from)
}
