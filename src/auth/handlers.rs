//! Authentication handlers
//!
//! Each handler is the orchestrator for one flow: resolve or verify the
//! identity or token, mint or rotate a token pair, persist, respond. Every
//! step short-circuits with a typed error; nothing here calls back into
//! other subsystems.

use axum::extract::{Extension, Json, Path, Query};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::extractors::AuthedUser;
use super::models::{
    AuthResponse, LoginRequest, LogoutRequest, OAuthCallbackParams, RefreshRequest,
    RegisterRequest, User,
};
use crate::common::{safe_email_log, safe_token_log, ApiError, AppState};

/// Mint a fresh access/refresh pair for a user and persist the refresh side
async fn mint_tokens(state: &AppState, user: &User) -> Result<AuthResponse, ApiError> {
    let access_token = state.tokens.issue_access(&user.username)?;
    let refresh_token = state.tokens.issue_refresh();
    state.refresh_tokens.put(&refresh_token, user.id).await?;

    Ok(AuthResponse {
        access_token,
        refresh_token,
        username: user.username.clone(),
        role: user.role.as_str().to_string(),
    })
}

/// POST /api/auth/register
/// Creates a local-password account and returns a token tuple
///
/// # Response
/// ```json
/// {
///   "accessToken": "<jwt>",
///   "refreshToken": "<opaque>",
///   "username": "user@example.com",
///   "role": "USER"
/// }
/// ```
pub async fn register(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    let user = state
        .identity
        .register_local(payload.username.trim(), &payload.password)
        .await?;

    let resp = mint_tokens(&state, &user).await?;
    info!(user_id = user.id, username = %safe_email_log(&user.username), "User registered");
    Ok(Json(resp))
}

/// POST /api/auth/login
/// Verifies local credentials and returns a token tuple
pub async fn login(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let user = state
        .identity
        .verify_local(&payload.username, &payload.password)
        .await?;

    let resp = mint_tokens(&state, &user).await?;
    info!(user_id = user.id, username = %safe_email_log(&user.username), "User logged in");
    Ok(Json(resp))
}

/// POST /api/auth/refresh
/// Rotates a refresh token: the presented token is consumed atomically and a
/// new access/refresh pair is issued. A second attempt with the same value
/// fails with TOKEN_NOT_FOUND.
pub async fn refresh(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let state = state_lock.read().await.clone();
    let presented = payload.refresh_token;

    if !state.tokens.verify_refresh_format(&presented) {
        // Malformed values can still shadow a stale row; clear it so a
        // retried request does not trip the same half-consumed state.
        let _ = state.refresh_tokens.revoke(&presented).await;
        warn!(token = %safe_token_log(&presented), "Refresh rejected: malformed token");
        return Err(ApiError::TokenInvalid);
    }

    // consume() looks up and deletes in one statement; concurrent calls on
    // the same value see exactly one success.
    let user = state.refresh_tokens.consume(&presented).await?;

    let resp = mint_tokens(&state, &user).await?;
    info!(user_id = user.id, "Refresh token rotated");
    Ok(Json(resp))
}

/// POST /api/auth/logout
/// Revokes the presented refresh token. Idempotent; the access token simply
/// ages out since self-contained tokens are not revocable.
pub async fn logout(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<LogoutRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    state.refresh_tokens.revoke(&payload.refresh_token).await?;
    info!("User logout successful");
    Ok(Json(serde_json::json!({ "message": "Logout successful" })))
}

/// GET /api/auth/oauth2/authorize/{provider}
/// Starts an OAuth2 flow: issues a CSRF state, persists it, and redirects
/// the user-agent to the provider's authorization page
pub async fn oauth2_authorize(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    let state = state_lock.read().await.clone();

    // Unknown provider fails before anything is persisted or sent.
    let oauth_provider = state.providers.get(&provider)?;

    let csrf_state = state.oauth_states.issue(&provider).await?;
    let auth_url = oauth_provider.authorization_url(&csrf_state);

    info!(provider = %provider, "Redirecting to OAuth2 provider");
    Ok((StatusCode::FOUND, [(header::LOCATION, auth_url)]).into_response())
}

/// GET /api/auth/oauth2/callback/{provider}?code=...&state=...
/// Completes an OAuth2 flow. The state is consumed before the network round
/// trip to the provider, and consumption is irreversible: a downstream
/// exchange or profile failure never resurrects the state.
pub async fn oauth2_callback(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(provider): Path<String>,
    Query(params): Query<OAuthCallbackParams>,
) -> Result<Json<AuthResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    // Provider lookup first: an unconfigured name must fail before any
    // state consumption or network call.
    let oauth_provider = state.providers.get(&provider)?;

    let valid = state
        .oauth_states
        .validate_and_consume(&provider, &params.state)
        .await?;
    if !valid {
        return Err(ApiError::StateInvalid);
    }

    let provider_token = oauth_provider.exchange_code(&params.code).await?;
    let profile = oauth_provider.fetch_user_info(&provider_token).await?;

    let user = state
        .identity
        .find_or_create_oauth(&provider, &profile)
        .await?;

    let resp = mint_tokens(&state, &user).await?;
    info!(
        user_id = user.id,
        email = %safe_email_log(&user.username),
        provider = %provider,
        "User authenticated via OAuth2"
    );
    Ok(Json(resp))
}

/// GET /api/me
/// Returns the authenticated user's identity as resolved from the access
/// token's verified subject claim
pub async fn me_handler(authed: AuthedUser) -> Result<Json<serde_json::Value>, ApiError> {
    let resp = serde_json::json!({
        "id": authed.user.id,
        "username": authed.user.username,
        "role": authed.user.role,
        "provider": authed.user.provider,
    });
    Ok(Json(resp))
}
