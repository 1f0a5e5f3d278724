//! Persistent single-use credential stores
//!
//! Refresh tokens and OAuth2 states are both consume-once rows. Consumption
//! is a single conditional `DELETE ... RETURNING`, so two concurrent callers
//! racing on the same value observe exactly one success. Neither store
//! exposes a read-without-delete path.

use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::models::User;
use crate::common::{safe_token_log, ApiError};

const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Age of a row whose `created_at` was written by sqlite's `datetime('now')`
fn row_age(created_at: &str) -> Option<Duration> {
    let created = NaiveDateTime::parse_from_str(created_at, SQLITE_DATETIME_FMT).ok()?;
    Some(Utc::now().naive_utc() - created)
}

/// Store mapping opaque refresh token values to their owning user.
///
/// This is the only revocable credential in the system, which makes the
/// store the security boundary for session lifetime.
pub struct RefreshTokenStore {
    db: SqlitePool,
    ttl: Duration,
}

impl RefreshTokenStore {
    pub fn new(db: SqlitePool, ttl_days: i64) -> Self {
        Self {
            db,
            ttl: Duration::days(ttl_days),
        }
    }

    /// Insert a freshly issued token for the given user.
    /// A primary key collision cannot happen with 64 random characters, but
    /// it is still surfaced as an error rather than silently overwritten.
    pub async fn put(&self, token: &str, user_id: i64) -> Result<(), ApiError> {
        sqlx::query("INSERT INTO refresh_tokens (token, user_id) VALUES (?, ?)")
            .bind(token)
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(|e| {
                if e.as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false)
                {
                    error!(token = %safe_token_log(token), "Refresh token value collision");
                    ApiError::InternalServer("refresh token collision".to_string())
                } else {
                    ApiError::DatabaseError(e)
                }
            })?;
        Ok(())
    }

    /// Atomically look up and delete a token, returning its owner.
    ///
    /// The delete and the lookup are one statement; a concurrent consume of
    /// the same value gets zero rows back and reports `TokenNotFound`.
    /// Rows older than the TTL are consumed but not honored.
    pub async fn consume(&self, token: &str) -> Result<User, ApiError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("DELETE FROM refresh_tokens WHERE token = ? RETURNING user_id, created_at")
                .bind(token)
                .fetch_optional(&self.db)
                .await
                .map_err(ApiError::DatabaseError)?;

        let (user_id, created_at) = match row {
            Some(r) => r,
            None => {
                warn!(token = %safe_token_log(token), "Refresh token not found or already used");
                return Err(ApiError::TokenNotFound);
            }
        };

        match row_age(&created_at) {
            Some(age) if age <= self.ttl => {}
            _ => {
                warn!(token = %safe_token_log(token), "Refresh token expired");
                return Err(ApiError::TokenNotFound);
            }
        }

        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
            .map_err(ApiError::DatabaseError)?;

        user.ok_or(ApiError::TokenNotFound)
    }

    /// Idempotent delete; absence is not an error
    pub async fn revoke(&self, token: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.db)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(())
    }

    /// Delete all rows past the TTL; returns the number removed
    pub async fn sweep_expired(&self) -> Result<u64, ApiError> {
        let cutoff = format!("-{} seconds", self.ttl.num_seconds());
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE created_at < datetime('now', ?)",
        )
        .bind(cutoff)
        .execute(&self.db)
        .await
        .map_err(ApiError::DatabaseError)?;
        Ok(result.rows_affected())
    }
}

/// Store for short-lived OAuth2 CSRF states
pub struct OAuthStateStore {
    db: SqlitePool,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new(db: SqlitePool, ttl_minutes: i64) -> Self {
        Self {
            db,
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Generate and persist a state string for a pending authorization
    pub async fn issue(&self, provider: &str) -> Result<String, ApiError> {
        let state = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO oauth2_states (state, provider) VALUES (?, ?)")
            .bind(&state)
            .bind(provider)
            .execute(&self.db)
            .await
            .map_err(ApiError::DatabaseError)?;
        debug!(provider = %provider, "Issued OAuth2 state");
        Ok(state)
    }

    /// True only if a matching unexpired row existed. The row is consumed
    /// either way, so a state can never validate twice, even when the
    /// validation itself fails.
    pub async fn validate_and_consume(
        &self,
        provider: &str,
        state: &str,
    ) -> Result<bool, ApiError> {
        let row: Option<(String,)> = sqlx::query_as(
            "DELETE FROM oauth2_states WHERE state = ? AND provider = ? RETURNING created_at",
        )
        .bind(state)
        .bind(provider)
        .fetch_optional(&self.db)
        .await
        .map_err(ApiError::DatabaseError)?;

        let created_at = match row {
            Some((c,)) => c,
            None => {
                warn!(provider = %provider, "OAuth2 state unknown or already consumed");
                return Ok(false);
            }
        };

        match row_age(&created_at) {
            Some(age) if age <= self.ttl => Ok(true),
            _ => {
                warn!(provider = %provider, "OAuth2 state expired");
                Ok(false)
            }
        }
    }

    /// Delete all rows past the TTL; returns the number removed
    pub async fn sweep_expired(&self) -> Result<u64, ApiError> {
        let cutoff = format!("-{} seconds", self.ttl.num_seconds());
        let result = sqlx::query(
            "DELETE FROM oauth2_states WHERE created_at < datetime('now', ?)",
        )
        .bind(cutoff)
        .execute(&self.db)
        .await
        .map_err(ApiError::DatabaseError)?;
        Ok(result.rows_affected())
    }
}
