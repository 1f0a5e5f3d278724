// src/services/google.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

use super::oauth::{OAuthError, OAuthProvider, OAuthUserProfile};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Outbound timeout; a slow provider terminates the flow as an upstream
/// failure rather than holding the request open
const UPSTREAM_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Google variant of the OAuth2 provider capability set
pub struct GoogleProvider {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GoogleProvider {
    /// `redirect_uri` is the callback URL registered with Google. The same
    /// value goes into the authorization URL and the code exchange; a
    /// mismatch between the two is rejected by Google, not by us.
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            client_id,
            client_secret,
            redirect_uri,
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn authorization_url(&self, state: &str) -> String {
        let scope = "openid email profile";
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
            AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(scope),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let params = [
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        debug!("Exchanging authorization code with Google");

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Google token exchange failed");
            return Err(OAuthError::ExchangeFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let token_response = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| OAuthError::SerializationError(e.to_string()))?;

        info!("Exchanged authorization code with Google");
        Ok(token_response.access_token)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<OAuthUserProfile, OAuthError> {
        let response = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OAuthError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "Google userinfo fetch failed");
            return Err(OAuthError::UserInfoFailed(format!("HTTP {}", status)));
        }

        response
            .json::<OAuthUserProfile>()
            .await
            .map_err(|e| OAuthError::SerializationError(e.to_string()))
    }
}
