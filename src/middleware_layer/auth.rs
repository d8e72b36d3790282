use std::collections::HashSet;

use async_trait::async_trait;
use axum::http::HeaderValue;

use crate::{
    crypto::token::TokenService,
    error::{AppError, Result},
    methods,
    middleware_layer::pipeline::{Call, Principal, Stage},
    services::sessions::SessionStore,
};

/// Methods exempt from authentication, fixed at startup.
#[derive(Debug, Clone)]
pub struct BypassList {
    methods: HashSet<String>,
}

impl BypassList {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }

    /// The public endpoints of the forum API.
    pub fn standard() -> Self {
        Self::new(methods::PUBLIC_METHODS.iter().copied())
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains(method)
    }
}

/// Extracts the token from an `authorization: Bearer <token>` header.
///
/// # Arguments
///
/// * `header` - The raw `authorization` header, if the call carried one.
///
/// # Returns
///
/// A `Result<&str>` with the trimmed token. A missing header or scheme is
/// `Unauthenticated`; bytes outside visible ASCII are `InvalidArgument`.
fn bearer_token(header: Option<&HeaderValue>) -> Result<&str> {
    let Some(header) = header else {
        tracing::debug!("❌ No authorization header");
        return Err(AppError::Unauthenticated);
    };

    let value = header.to_str().map_err(|_| {
        tracing::warn!("❌ Authorization header is not visible ASCII");
        AppError::InvalidArgument("malformed authorization header".to_string())
    })?;

    match value.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => {
            tracing::debug!("❌ Authorization header is not a bearer credential");
            Err(AppError::Unauthenticated)
        }
    }
}

/// Verifies the caller's session and attaches its [`Principal`].
///
/// Precondition: the call was admitted by every earlier stage.
/// Postcondition on success: the call carries a principal whose session
/// existed at verification time and has been touched, unless the method is
/// on the bypass list, in which case nothing is attached.
pub struct AuthorizationStage {
    tokens: TokenService,
    sessions: SessionStore,
    bypass: BypassList,
}

impl AuthorizationStage {
    pub fn new(tokens: TokenService, sessions: SessionStore, bypass: BypassList) -> Self {
        Self { tokens, sessions, bypass }
    }
}

#[async_trait]
impl Stage for AuthorizationStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn admit(&self, call: &mut Call) -> Result<()> {
        if self.bypass.contains(call.method()) {
            return Ok(());
        }

        let token = bearer_token(call.authorization())?;
        let session_id = self.tokens.verify_access_token(token)?;

        // A revoked session looks exactly like a forged token to the caller.
        let session = match self.sessions.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!(%session_id, "❌ Session not found or revoked");
                return Err(AppError::Unauthenticated);
            }
            Err(e) => {
                tracing::error!(%session_id, "Session lookup failed: {}", e);
                return Err(AppError::Internal("session lookup failed".to_string()));
            }
        };

        if let Err(e) = self.sessions.touch(&session).await {
            tracing::error!(%session_id, "Session touch failed: {}", e);
            return Err(AppError::Internal("session touch failed".to_string()));
        }

        tracing::debug!(%session_id, user_id = %session.user_id, "✅ Call authenticated");
        call.set_principal(Principal::new(session.id, session.user_id));
        Ok(())
    }
}
