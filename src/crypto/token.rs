//! Signed, expiring tokens bound to a session.
//!
//! Both token classes are HS256 JWTs whose subject is a session id. The
//! `typ` claim separates access from refresh tokens so one can never be
//! replayed in place of the other.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// The class of a token, carried in the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

/// Claims embedded in every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject -- the session id.
    pub sub: Uuid,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Token class.
    pub typ: TokenClass,
}

/// A freshly issued access/refresh token pair.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and verifies session tokens with a symmetric key.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl TokenService {
    /// Creates a token service signing with `secret`.
    pub fn new(secret: &[u8], access_ttl: chrono::Duration, refresh_ttl: chrono::Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    fn issue(&self, session_id: Uuid, typ: TokenClass, ttl: chrono::Duration) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: session_id,
            iat: now,
            exp: now + ttl.num_seconds(),
            typ,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Issues a short-lived access token for `session_id`.
    pub fn issue_access_token(&self, session_id: Uuid) -> Result<String> {
        self.issue(session_id, TokenClass::Access, self.access_ttl)
    }

    /// Issues a long-lived refresh token for `session_id`.
    pub fn issue_refresh_token(&self, session_id: Uuid) -> Result<String> {
        self.issue(session_id, TokenClass::Refresh, self.refresh_ttl)
    }

    /// Issues both tokens for `session_id`.
    pub fn issue_pair(&self, session_id: Uuid) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(session_id)?,
            refresh_token: self.issue_refresh_token(session_id)?,
        })
    }

    /// Decodes `token` and checks it is of the expected class.
    ///
    /// Every failure collapses into `Unauthenticated`; the cause is only logged.
    fn verify(&self, token: &str, expected: TokenClass) -> Result<Uuid> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AppError::Unauthenticated
        })?;

        if data.claims.typ != expected {
            tracing::debug!(expected = ?expected, found = ?data.claims.typ, "token class mismatch");
            return Err(AppError::Unauthenticated);
        }

        Ok(data.claims.sub)
    }

    /// Verifies an access token, returning its session id.
    pub fn verify_access_token(&self, token: &str) -> Result<Uuid> {
        self.verify(token, TokenClass::Access)
    }

    /// Verifies a refresh token, returning its session id.
    pub fn verify_refresh_token(&self, token: &str) -> Result<Uuid> {
        self.verify(token, TokenClass::Refresh)
    }
}
