//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::models::User;
use crate::common::{safe_email_log, ApiError, AppState};

/// Authenticated user extractor
///
/// Verifies the bearer access token's signature and expiry, then loads the
/// user behind the subject claim. Downstream authorization middleware keys
/// off the resolved user carried here.
#[derive(Debug)]
pub struct AuthedUser {
    pub user: User,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let app_state = state_lock.read().await.clone();

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        let token = match token {
            Some(t) => t,
            None => {
                warn!("Authentication failed: missing Authorization header");
                return Err(ApiError::Unauthorized("missing auth".into()));
            }
        };

        // Handle "Bearer <token>" format or raw token
        let bare_token = if let Some(rest) = token.strip_prefix("Bearer ") {
            rest.to_string()
        } else {
            token
        };

        // Signature and expiry check is pure; the store is not consulted.
        let subject = app_state.tokens.verify_access(&bare_token)?;

        let user = app_state
            .identity
            .find_by_username(&subject)
            .await?
            .ok_or_else(|| {
                warn!(subject = %safe_email_log(&subject), "Authentication failed: user not found");
                ApiError::Unauthorized("user not found".into())
            })?;

        debug!(
            user_id = user.id,
            username = %safe_email_log(&user.username),
            "User authentication successful via extractor"
        );

        Ok(AuthedUser { user })
    }
}
