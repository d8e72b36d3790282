use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// The minimum length of the token signing secret in bytes.
const MIN_SECRET_LEN: usize = 32;
/// Upper bound for day-valued settings (about ten years).
const MAX_DAYS: i64 = 3650;
/// Upper bound for the access token lifetime (one day).
const MAX_ACCESS_TTL_MINUTES: i64 = 24 * 60;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The address the server listens on.
    pub bind_addr: SocketAddr,
    /// The symmetric key used to sign access and refresh tokens.
    pub jwt_secret: Zeroizing<Vec<u8>>,
    /// Access token lifetime in minutes.
    pub access_token_ttl_minutes: i64,
    /// Refresh token lifetime in days.
    pub refresh_token_ttl_days: i64,
    /// Tokens added to each client bucket per second.
    pub rate_limit_per_second: f64,
    /// The capacity of each client bucket.
    pub rate_limit_burst: u32,
    /// How often idle client buckets are swept, in seconds.
    pub rate_limit_sweep_seconds: u64,
    /// Sessions untouched for this many days are reaped.
    pub session_idle_days: i64,
    /// How often the session reaper runs, in seconds.
    pub session_reap_interval_seconds: u64,
}

/// Reads an optional variable, falling back to `default` when unset.
fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result<Config>`; fails when a required variable is missing, a value
    /// does not parse, or [`Config::validate`] rejects it.
    ///
    /// | Env Var                          | Required | Default          |
    /// |----------------------------------|----------|------------------|
    /// | `DATABASE_URL`                   | **yes**  | --               |
    /// | `JWT_SECRET`                     | **yes**  | --               |
    /// | `BIND_ADDR`                      | no       | `127.0.0.1:3000` |
    /// | `ACCESS_TOKEN_TTL_MINUTES`       | no       | `15`             |
    /// | `REFRESH_TOKEN_TTL_DAYS`         | no       | `30`             |
    /// | `RATE_LIMIT_PER_SECOND`          | no       | `5`              |
    /// | `RATE_LIMIT_BURST`               | no       | `600`            |
    /// | `RATE_LIMIT_SWEEP_SECONDS`       | no       | `60`             |
    /// | `SESSION_IDLE_DAYS`              | no       | `30`             |
    /// | `SESSION_REAP_INTERVAL_SECONDS`  | no       | `3600`           |
    pub fn from_env() -> Result<Self> {
        let jwt_secret = Zeroizing::new(
            env::var("JWT_SECRET")
                .context("JWT_SECRET must be set (generate with: openssl rand -hex 32)")?
                .into_bytes(),
        );

        if jwt_secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("JWT_SECRET must be at least {} bytes", MIN_SECRET_LEN);
        }

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            bind_addr: var_or("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            jwt_secret,
            access_token_ttl_minutes: var_or("ACCESS_TOKEN_TTL_MINUTES", 15)?,
            refresh_token_ttl_days: var_or("REFRESH_TOKEN_TTL_DAYS", 30)?,
            rate_limit_per_second: var_or("RATE_LIMIT_PER_SECOND", 5.0)?,
            rate_limit_burst: var_or("RATE_LIMIT_BURST", 600)?,
            rate_limit_sweep_seconds: var_or("RATE_LIMIT_SWEEP_SECONDS", 60)?,
            session_idle_days: var_or("SESSION_IDLE_DAYS", 30)?,
            session_reap_interval_seconds: var_or("SESSION_REAP_INTERVAL_SECONDS", 3600)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Access token lifetime, `None` when out of range.
    pub fn access_token_ttl(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_minutes(self.access_token_ttl_minutes)
    }

    /// Refresh token lifetime, `None` when out of range.
    pub fn refresh_token_ttl(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_days(self.refresh_token_ttl_days)
    }

    /// How long a session may sit untouched, `None` when out of range.
    pub fn session_idle(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_days(self.session_idle_days)
    }

    /// Rejects values that would disable a safeguard or overflow a duration.
    ///
    /// # Returns
    ///
    /// A `Result<()>` naming the first offending variable.
    pub fn validate(&self) -> Result<()> {
        if self.access_token_ttl_minutes <= 0 || self.refresh_token_ttl_days <= 0 {
            anyhow::bail!("Token TTLs must be positive");
        }
        if self.access_token_ttl_minutes > MAX_ACCESS_TTL_MINUTES {
            anyhow::bail!("ACCESS_TOKEN_TTL_MINUTES must be at most {}", MAX_ACCESS_TTL_MINUTES);
        }
        if self.refresh_token_ttl_days > MAX_DAYS || self.session_idle_days > MAX_DAYS {
            anyhow::bail!("REFRESH_TOKEN_TTL_DAYS and SESSION_IDLE_DAYS must be at most {}", MAX_DAYS);
        }
        if !(self.rate_limit_per_second.is_finite() && self.rate_limit_per_second > 0.0) {
            anyhow::bail!("RATE_LIMIT_PER_SECOND must be a positive number");
        }
        match std::time::Duration::try_from_secs_f64(1.0 / self.rate_limit_per_second) {
            Ok(period) if !period.is_zero() => {}
            _ => anyhow::bail!("RATE_LIMIT_PER_SECOND is outside the representable range"),
        }
        if self.rate_limit_burst == 0 {
            anyhow::bail!("RATE_LIMIT_BURST must be at least 1");
        }
        if self.session_idle_days <= 0 {
            anyhow::bail!("SESSION_IDLE_DAYS must be positive");
        }
        if self.rate_limit_sweep_seconds == 0 || self.session_reap_interval_seconds == 0 {
            anyhow::bail!("Background intervals must be at least one second");
        }
        Ok(())
    }
}
