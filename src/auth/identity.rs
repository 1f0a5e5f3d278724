//! Find-or-create identity resolution across local-password and
//! OAuth2-derived accounts

use sqlx::SqlitePool;
use tracing::{info, warn};

use super::models::User;
use crate::common::{safe_email_log, ApiError};
use crate::services::oauth::OAuthUserProfile;

const BCRYPT_COST: u32 = 12;

pub struct IdentityResolver {
    db: SqlitePool,
}

impl IdentityResolver {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a local-password account. The uniqueness violation from the
    /// persistence layer is translated into `DuplicateUsername`; no partial
    /// row survives a rejected attempt.
    pub async fn register_local(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let hash = bcrypt::hash(password, BCRYPT_COST)
            .map_err(|e| ApiError::InternalServer(format!("password hashing failed: {}", e)))?;

        let user: Option<User> = sqlx::query_as(
            "INSERT INTO users (username, password_hash) VALUES (?, ?) RETURNING *",
        )
        .bind(username)
        .bind(&hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false)
            {
                warn!(username = %safe_email_log(username), "Registration rejected: duplicate username");
                ApiError::DuplicateUsername
            } else {
                ApiError::DatabaseError(e)
            }
        })?;

        let user = user
            .ok_or_else(|| ApiError::InternalServer("user insert returned no row".to_string()))?;
        info!(user_id = user.id, username = %safe_email_log(username), "Registered local account");
        Ok(user)
    }

    /// Verify local credentials. Unknown usernames and wrong passwords are
    /// indistinguishable to the caller. Accounts without a password hash
    /// (OAuth2-only) never pass a password check.
    pub async fn verify_local(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await
            .map_err(ApiError::DatabaseError)?;

        let user = match user {
            Some(u) => u,
            None => {
                warn!(username = %safe_email_log(username), "Login rejected: unknown username");
                return Err(ApiError::InvalidCredentials);
            }
        };

        let hash = match &user.password_hash {
            Some(h) => h.clone(),
            None => {
                warn!(user_id = user.id, "Login rejected: passwordless OAuth2 account");
                return Err(ApiError::InvalidCredentials);
            }
        };

        let matches = bcrypt::verify(password, &hash)
            .map_err(|e| ApiError::InternalServer(format!("password verify failed: {}", e)))?;
        if !matches {
            warn!(user_id = user.id, "Login rejected: wrong password");
            return Err(ApiError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Resolve an OAuth2 profile to a local user by email-as-username.
    ///
    /// An existing row is returned unmodified: a local-password account is
    /// never re-tagged into an OAuth2 account on email collision. Absent
    /// rows become passwordless accounts tagged with the provider.
    pub async fn find_or_create_oauth(
        &self,
        provider: &str,
        profile: &OAuthUserProfile,
    ) -> Result<User, ApiError> {
        let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(&profile.email)
            .fetch_optional(&self.db)
            .await
            .map_err(ApiError::DatabaseError)?;

        if let Some(user) = existing {
            return Ok(user);
        }

        let inserted: Result<Option<User>, sqlx::Error> = sqlx::query_as(
            "INSERT INTO users (username, provider) VALUES (?, ?) RETURNING *",
        )
        .bind(&profile.email)
        .bind(provider)
        .fetch_optional(&self.db)
        .await;

        match inserted {
            Ok(Some(user)) => {
                info!(
                    user_id = user.id,
                    email = %safe_email_log(&profile.email),
                    provider = %provider,
                    "Created new account via OAuth2"
                );
                Ok(user)
            }
            Ok(None) => Err(ApiError::InternalServer(
                "user insert returned no row".to_string(),
            )),
            Err(e)
                if e.as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false) =>
            {
                // Lost a create race; the winner's row is the identity.
                let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
                    .bind(&profile.email)
                    .fetch_optional(&self.db)
                    .await
                    .map_err(ApiError::DatabaseError)?;
                user.ok_or_else(|| {
                    ApiError::InternalServer("user vanished after insert race".to_string())
                })
            }
            Err(e) => Err(ApiError::DatabaseError(e)),
        }
    }

    /// Look up a user by username; used by the request extractor after the
    /// access token subject has been verified
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await
            .map_err(ApiError::DatabaseError)
    }
}
