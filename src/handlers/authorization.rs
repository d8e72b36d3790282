use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    crypto::password::{hash_password, verify_password},
    error::{AppError, Result},
    handlers::payload::Payload,
    middleware_layer::pipeline::{ClientAddr, Principal},
    models::session::{NewSession, Session},
    pagination::PageRequest,
    state::AppState,
};

/// The request payload for user login.
#[derive(Deserialize, Validate, Debug)]
pub struct LoginRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1, max = 128))]
    pub password: String,
}

/// The request payload for exchanging a refresh token.
#[derive(Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[garde(length(min = 1))]
    pub refresh_token: String,
}

/// The request payload for revoking one of the caller's sessions.
#[derive(Deserialize, Validate)]
pub struct RevokeSessionRequest {
    #[garde(length(min = 1))]
    pub session_id: String,
}

/// The request payload for changing a user's password.
#[derive(Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[garde(length(min = 1, max = 128))]
    pub old_password: String,
    #[garde(length(min = 12, max = 128))]
    pub new_password: String,
}

/// A session as shown to its owner.
#[derive(Serialize, Debug)]
pub struct SessionView {
    pub session_id: Uuid,
    pub user_agent: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether this is the session making the call.
    pub is_current: bool,
}

impl SessionView {
    fn of(session: Session, current: Uuid) -> Self {
        Self {
            is_current: session.id == current,
            session_id: session.id,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// The response payload for a successful login.
#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub session: SessionView,
}

/// The response payload for a refresh.
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// The response payload for calls that only report success.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// Opens a session for a verified account and issues its token pair.
pub async fn login(
    State(state): State<AppState>,
    Extension(ClientAddr(peer)): Extension<ClientAddr>,
    headers: HeaderMap,
    Payload(payload): Payload<LoginRequest>,
) -> Result<Response> {
    payload.validate()?;
    tracing::info!("🔐 Login attempt for {}", payload.email);

    // Unknown accounts verify against a decoy hash: every failure costs one
    // Argon2 verification.
    let user = state.users.find_by_email(&payload.email).await?;
    let hash = user
        .as_ref()
        .map_or(&*state.login_decoy, |u| u.password_hash.as_str());
    let password_ok = verify_password(&payload.password, hash)?;

    let user = match user {
        Some(user) if password_ok => user,
        Some(user) => {
            tracing::warn!(user_id = %user.id, "❌ Login failed: wrong password");
            return Err(AppError::Unauthenticated);
        }
        None => {
            tracing::warn!("❌ Login failed: unknown email");
            return Err(AppError::Unauthenticated);
        }
    };

    if !user.is_verified {
        return Err(AppError::InvalidArgument("email address is not verified".to_string()));
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let ip_address = peer
        .map(|p| p.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let session = state
        .sessions
        .create(NewSession {
            user_id: user.id,
            user_agent,
            ip_address,
        })
        .await?;
    let pair = state.tokens.issue_pair(session.id)?;

    tracing::info!(user_id = %user.id, session_id = %session.id, "✅ Login successful");

    let current = session.id;
    let response = LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        session: SessionView::of(session, current),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Exchanges a refresh token for a fresh pair bound to the same session.
pub async fn refresh_token(
    State(state): State<AppState>,
    Payload(payload): Payload<RefreshTokenRequest>,
) -> Result<Response> {
    payload.validate()?;

    let session_id = state.tokens.verify_refresh_token(&payload.refresh_token)?;
    let Some(session) = state.sessions.get(session_id).await? else {
        tracing::debug!(%session_id, "❌ Refresh for a revoked session");
        return Err(AppError::Unauthenticated);
    };
    state.sessions.touch(&session).await?;

    let pair = state.tokens.issue_pair(session.id)?;
    tracing::debug!(%session_id, "🔄 Tokens refreshed");

    let response = TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Revokes the calling session.
pub async fn logout(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    state.sessions.revoke(principal.session_id()).await?;
    tracing::info!(user_id = %principal.user_id(), "👋 Logout successful");

    let response = AuthResponse {
        success: true,
        message: "Logged out".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

pub async fn get_current_session(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response> {
    // Revoked between admission and here.
    let Some(session) = state.sessions.get(principal.session_id()).await? else {
        return Err(AppError::Unauthenticated);
    };

    let view = SessionView::of(session, principal.session_id());
    Ok((StatusCode::OK, Json(view)).into_response())
}

/// Lists the caller's sessions, newest first.
pub async fn list_active_sessions(
    State(state): State<AppState>,
    principal: Principal,
    Payload(page): Payload<PageRequest>,
) -> Result<Response> {
    let current = principal.session_id();
    let page = state
        .sessions
        .list_for_user(principal.user_id(), &page)
        .await?
        .map(|s| SessionView::of(s, current));

    Ok((StatusCode::OK, Json(page)).into_response())
}

/// Revokes another session owned by the caller.
///
/// Sessions of other users are reported as missing.
pub async fn revoke_session(
    State(state): State<AppState>,
    principal: Principal,
    Payload(payload): Payload<RevokeSessionRequest>,
) -> Result<Response> {
    payload.validate()?;

    let target = Uuid::parse_str(payload.session_id.trim())
        .map_err(|_| AppError::InvalidArgument("session_id is not a valid id".to_string()))?;

    if target == principal.session_id() {
        return Err(AppError::InvalidArgument(
            "use Logout to end the current session".to_string(),
        ));
    }

    match state.sessions.get(target).await? {
        Some(session) if session.user_id == principal.user_id() => {}
        _ => return Err(AppError::NotFound),
    }

    state.sessions.revoke(target).await?;

    let response = AuthResponse {
        success: true,
        message: "Session revoked".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Replaces the caller's password and signs out every device.
pub async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    Payload(payload): Payload<ChangePasswordRequest>,
) -> Result<Response> {
    payload.validate()?;

    let user = state
        .users
        .find_by_id(principal.user_id())
        .await?
        .ok_or_else(|| AppError::Internal("session owner not found".to_string()))?;

    if !verify_password(&payload.old_password, &user.password_hash)? {
        return Err(AppError::InvalidArgument("current password is incorrect".to_string()));
    }

    let new_hash = hash_password(&payload.new_password)?;
    state.users.update_password(user.id, &new_hash).await?;

    let revoked = state.sessions.revoke_all_for_user(user.id).await?;
    tracing::info!(user_id = %user.id, revoked, "✅ Password changed");

    let response = AuthResponse {
        success: true,
        message: "Password changed. Please log in again.".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
