// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::auth::identity::IdentityResolver;
use crate::auth::store::{OAuthStateStore, RefreshTokenStore};
use crate::auth::tokens::TokenCodec;
use crate::services::oauth::ProviderRegistry;

/// Application state containing the database pool and the authentication
/// services built on top of it
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub tokens: Arc<TokenCodec>,
    pub refresh_tokens: Arc<RefreshTokenStore>,
    pub oauth_states: Arc<OAuthStateStore>,
    pub identity: Arc<IdentityResolver>,
    pub providers: Arc<ProviderRegistry>,
}
