// src/services/oauth.rs
//! OAuth2 provider capability set and registry
//!
//! Providers are registered by name at startup; looking up an unregistered
//! name fails with `UnsupportedProvider` before any network call is made.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::common::ApiError;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth provider not configured")]
    NotConfigured,

    #[error("code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("user info fetch failed: {0}")]
    UserInfoFailed(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("unexpected response shape: {0}")]
    SerializationError(String),
}

impl From<OAuthError> for ApiError {
    fn from(e: OAuthError) -> Self {
        ApiError::UpstreamAuthFailure(e.to_string())
    }
}

/// Normalized identity fetched from a provider's userinfo endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthUserProfile {
    /// Provider-scoped stable subject id
    pub sub: String,
    pub name: Option<String>,
    pub email: String,
    pub picture: Option<String>,
}

/// Capability set every OAuth2 provider variant implements
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Full authorization URL to redirect the user-agent to, carrying the
    /// CSRF state issued for this flow
    fn authorization_url(&self, state: &str) -> String;

    /// Server-to-server exchange of the callback code for a provider access
    /// token. Sends exactly the redirect URI presented to the user-agent.
    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError>;

    /// Fetch and normalize the profile behind a provider access token
    async fn fetch_user_info(&self, access_token: &str) -> Result<OAuthUserProfile, OAuthError>;
}

/// Name-keyed registry of provider variants, populated at startup
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, provider: Arc<dyn OAuthProvider>) {
        self.providers.insert(name.to_string(), provider);
    }

    /// Resolve a provider by the name supplied as a path parameter
    pub fn get(&self, name: &str) -> Result<Arc<dyn OAuthProvider>, ApiError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::UnsupportedProvider(name.to_string()))
    }
}
