//! Stateless signing and verification of bearer credentials
//!
//! Access tokens are self-contained HS256 claim sets; refresh tokens are
//! opaque random lookup keys whose existence is the store's concern.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use tracing::warn;

use super::models::Claims;
use crate::common::rand_token::{generate_refresh_token, is_refresh_token_shaped};
use crate::common::ApiError;

/// Signs and verifies access tokens with a key handed in at construction.
/// No ambient or static secret is consulted anywhere.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, access_ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::minutes(access_ttl_minutes),
        }
    }

    /// Issue a signed access token for the given subject (username)
    pub fn issue_access(&self, subject: &str) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + self.access_ttl).timestamp() as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            ApiError::InternalServer(format!("jwt encoding failed: {}", e))
        })
    }

    /// Issue an opaque refresh token. Not a claim set; the persisted row in
    /// the refresh token store is its only meaning.
    pub fn issue_refresh(&self) -> String {
        generate_refresh_token()
    }

    /// Verify an access token signature and expiry, returning the subject.
    /// Pure; no store lookup is involved.
    pub fn verify_access(&self, token: &str) -> Result<String, ApiError> {
        match decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Ok(data.claims.sub),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                warn!("Access token expired");
                Err(ApiError::TokenExpired)
            }
            Err(e) => {
                warn!(error = %e, "Access token verification failed");
                Err(ApiError::TokenInvalid)
            }
        }
    }

    /// Structural check on a presented refresh token value
    pub fn verify_refresh_format(&self, token: &str) -> bool {
        is_refresh_token_shaped(token)
    }
}
