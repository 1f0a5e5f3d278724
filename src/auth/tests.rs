//! Tests for auth module
//!
//! Covers the token codec, the single-use store semantics for refresh
//! tokens and OAuth2 states, identity resolution, and the provider
//! registry lookup path.

#[cfg(test)]
mod tests {
    use super::super::extractors::AuthedUser;
    use super::super::identity::IdentityResolver;
    use super::super::store::{OAuthStateStore, RefreshTokenStore};
    use super::super::tokens::TokenCodec;
    use crate::common::{ApiError, AppState};
    use crate::services::oauth::{OAuthUserProfile, ProviderRegistry};
    use axum::extract::FromRequestParts;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    async fn test_pool() -> SqlitePool {
        // A single connection keeps the in-memory database alive and shared
        // across all queries in a test.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");
        crate::common::migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn app_state_for(pool: SqlitePool) -> Arc<RwLock<AppState>> {
        let state = AppState {
            db: pool.clone(),
            tokens: Arc::new(TokenCodec::new("test_secret_key", 15)),
            refresh_tokens: Arc::new(RefreshTokenStore::new(pool.clone(), 14)),
            oauth_states: Arc::new(OAuthStateStore::new(pool.clone(), 5)),
            identity: Arc::new(IdentityResolver::new(pool)),
            providers: Arc::new(ProviderRegistry::new()),
        };
        Arc::new(RwLock::new(state))
    }

    fn request_parts(
        auth_header: Option<&str>,
        state: &Arc<RwLock<AppState>>,
    ) -> axum::http::request::Parts {
        let mut builder = axum::http::Request::builder().uri("/api/me");
        if let Some(value) = auth_header {
            builder = builder.header(axum::http::header::AUTHORIZATION, value);
        }
        let (mut parts, ()) = builder.body(()).expect("request").into_parts();
        parts.extensions.insert(state.clone());
        parts
    }

    fn profile(email: &str) -> OAuthUserProfile {
        OAuthUserProfile {
            sub: "google-sub-123".to_string(),
            name: Some("Test User".to_string()),
            email: email.to_string(),
            picture: None,
        }
    }

    // ---- TokenCodec ----

    #[test]
    fn test_access_token_roundtrip() {
        let codec = TokenCodec::new("test_secret_key", 15);
        let token = codec.issue_access("alice@example.com").expect("issue");
        let subject = codec.verify_access(&token).expect("verify");
        assert_eq!(subject, "alice@example.com");
    }

    #[test]
    fn test_access_token_rejected_with_wrong_secret() {
        let codec = TokenCodec::new("test_secret_key", 15);
        let other = TokenCodec::new("wrong_secret_key", 15);
        let token = codec.issue_access("alice@example.com").expect("issue");
        let result = other.verify_access(&token);
        assert!(matches!(result, Err(ApiError::TokenInvalid)));
    }

    #[test]
    fn test_access_token_expiry_detected() {
        // Negative TTL puts exp beyond the decoder's leeway into the past.
        let codec = TokenCodec::new("test_secret_key", -5);
        let token = codec.issue_access("alice@example.com").expect("issue");
        let result = codec.verify_access(&token);
        assert!(matches!(result, Err(ApiError::TokenExpired)));
    }

    #[test]
    fn test_garbage_access_token_is_invalid_not_expired() {
        let codec = TokenCodec::new("test_secret_key", 15);
        let result = codec.verify_access("not-a-jwt");
        assert!(matches!(result, Err(ApiError::TokenInvalid)));
    }

    #[test]
    fn test_refresh_token_format_check() {
        let codec = TokenCodec::new("test_secret_key", 15);
        let refresh = codec.issue_refresh();
        assert!(codec.verify_refresh_format(&refresh));
        assert!(!codec.verify_refresh_format("short"));
        assert!(!codec.verify_refresh_format(""));
    }

    // ---- RefreshTokenStore ----

    #[tokio::test]
    async fn test_refresh_token_single_use() {
        let pool = test_pool().await;
        let identity = IdentityResolver::new(pool.clone());
        let store = RefreshTokenStore::new(pool, 14);

        let user = identity
            .register_local("bob@example.com", "hunter22")
            .await
            .expect("register");

        store.put("A".repeat(64).as_str(), user.id).await.expect("put");

        let consumed = store.consume(&"A".repeat(64)).await.expect("first consume");
        assert_eq!(consumed.id, user.id);
        assert_eq!(consumed.username, "bob@example.com");

        let second = store.consume(&"A".repeat(64)).await;
        assert!(matches!(second, Err(ApiError::TokenNotFound)));
    }

    #[tokio::test]
    async fn test_concurrent_consume_yields_one_success() {
        let pool = test_pool().await;
        let identity = IdentityResolver::new(pool.clone());
        let store = std::sync::Arc::new(RefreshTokenStore::new(pool, 14));

        let user = identity
            .register_local("carol@example.com", "hunter22")
            .await
            .expect("register");

        let token = "B".repeat(64);
        store.put(&token, user.id).await.expect("put");

        let (a, b) = tokio::join!(store.consume(&token), store.consume(&token));
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1, "exactly one concurrent consume may succeed");

        let failure = if a.is_ok() { b } else { a };
        assert!(matches!(failure, Err(ApiError::TokenNotFound)));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_not_honored() {
        let pool = test_pool().await;
        let identity = IdentityResolver::new(pool.clone());
        let store = RefreshTokenStore::new(pool.clone(), 14);

        let user = identity
            .register_local("dan@example.com", "hunter22")
            .await
            .expect("register");

        let token = "C".repeat(64);
        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, created_at) \
             VALUES (?, ?, datetime('now', '-30 days'))",
        )
        .bind(&token)
        .bind(user.id)
        .execute(&pool)
        .await
        .expect("insert stale row");

        let result = store.consume(&token).await;
        assert!(matches!(result, Err(ApiError::TokenNotFound)));

        // The stale row was consumed, not left behind.
        let remaining: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens WHERE token = ?")
                .bind(&token)
                .fetch_one(&pool)
                .await
                .expect("count");
        assert_eq!(remaining.0, 0);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let pool = test_pool().await;
        let store = RefreshTokenStore::new(pool, 14);

        store.revoke("never-issued").await.expect("first revoke");
        store.revoke("never-issued").await.expect("second revoke");
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_rows() {
        let pool = test_pool().await;
        let identity = IdentityResolver::new(pool.clone());
        let store = RefreshTokenStore::new(pool.clone(), 14);

        let user = identity
            .register_local("eve@example.com", "hunter22")
            .await
            .expect("register");

        store.put(&"D".repeat(64), user.id).await.expect("put fresh");
        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, created_at) \
             VALUES (?, ?, datetime('now', '-30 days'))",
        )
        .bind("E".repeat(64))
        .bind(user.id)
        .execute(&pool)
        .await
        .expect("insert stale row");

        let removed = store.sweep_expired().await.expect("sweep");
        assert_eq!(removed, 1);

        let fresh = store.consume(&"D".repeat(64)).await;
        assert!(fresh.is_ok(), "fresh token must survive the sweep");
    }

    // ---- OAuthStateStore ----

    #[tokio::test]
    async fn test_oauth_state_is_single_use() {
        let pool = test_pool().await;
        let store = OAuthStateStore::new(pool, 5);

        let state = store.issue("google").await.expect("issue");

        let first = store
            .validate_and_consume("google", &state)
            .await
            .expect("validate");
        assert!(first);

        let second = store
            .validate_and_consume("google", &state)
            .await
            .expect("validate again");
        assert!(!second, "a state must never validate twice");
    }

    #[tokio::test]
    async fn test_forged_oauth_state_rejected() {
        let pool = test_pool().await;
        let store = OAuthStateStore::new(pool, 5);

        let result = store
            .validate_and_consume("google", "not-issued")
            .await
            .expect("validate");
        assert!(!result);
    }

    #[tokio::test]
    async fn test_oauth_state_bound_to_provider() {
        let pool = test_pool().await;
        let store = OAuthStateStore::new(pool, 5);

        let state = store.issue("google").await.expect("issue");
        let wrong_provider = store
            .validate_and_consume("github", &state)
            .await
            .expect("validate");
        assert!(!wrong_provider);

        // The row was not consumed by the mismatched lookup.
        let right_provider = store
            .validate_and_consume("google", &state)
            .await
            .expect("validate");
        assert!(right_provider);
    }

    #[tokio::test]
    async fn test_stale_oauth_state_rejected_and_consumed() {
        let pool = test_pool().await;
        let store = OAuthStateStore::new(pool.clone(), 5);

        sqlx::query(
            "INSERT INTO oauth2_states (state, provider, created_at) \
             VALUES ('stale-state', 'google', datetime('now', '-10 minutes'))",
        )
        .execute(&pool)
        .await
        .expect("insert stale state");

        let result = store
            .validate_and_consume("google", "stale-state")
            .await
            .expect("validate");
        assert!(!result);

        let remaining: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM oauth2_states WHERE state = 'stale-state'")
                .fetch_one(&pool)
                .await
                .expect("count");
        assert_eq!(remaining.0, 0, "stale state is consumed even on rejection");
    }

    // ---- IdentityResolver ----

    #[tokio::test]
    async fn test_register_then_login_succeeds() {
        let pool = test_pool().await;
        let identity = IdentityResolver::new(pool);

        let registered = identity
            .register_local("frank@example.com", "correct horse")
            .await
            .expect("register");

        let verified = identity
            .verify_local("frank@example.com", "correct horse")
            .await
            .expect("login");
        assert_eq!(verified.id, registered.id);
        assert_eq!(verified.username, "frank@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected_without_partial_row() {
        let pool = test_pool().await;
        let identity = IdentityResolver::new(pool.clone());

        identity
            .register_local("grace@example.com", "pw-one")
            .await
            .expect("first register");

        let second = identity.register_local("grace@example.com", "pw-two").await;
        assert!(matches!(second, Err(ApiError::DuplicateUsername)));

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = 'grace@example.com'")
                .fetch_one(&pool)
                .await
                .expect("count");
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_identical() {
        let pool = test_pool().await;
        let identity = IdentityResolver::new(pool);

        identity
            .register_local("heidi@example.com", "right-password")
            .await
            .expect("register");

        let wrong_pw = identity
            .verify_local("heidi@example.com", "wrong-password")
            .await;
        assert!(matches!(wrong_pw, Err(ApiError::InvalidCredentials)));

        let unknown = identity.verify_local("nobody@example.com", "whatever").await;
        assert!(matches!(unknown, Err(ApiError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_oauth_user_created_passwordless_with_provider_tag() {
        let pool = test_pool().await;
        let identity = IdentityResolver::new(pool);

        let user = identity
            .find_or_create_oauth("google", &profile("ivan@example.com"))
            .await
            .expect("find or create");

        assert_eq!(user.username, "ivan@example.com");
        assert_eq!(user.provider.as_deref(), Some("google"));
        assert!(user.password_hash.is_none());

        // Second resolution is idempotent.
        let again = identity
            .find_or_create_oauth("google", &profile("ivan@example.com"))
            .await
            .expect("second resolve");
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn test_oauth_collision_leaves_local_account_untouched() {
        let pool = test_pool().await;
        let identity = IdentityResolver::new(pool);

        let local = identity
            .register_local("judy@example.com", "local-password")
            .await
            .expect("register");

        let resolved = identity
            .find_or_create_oauth("google", &profile("judy@example.com"))
            .await
            .expect("resolve");

        // Existing local-password account is returned as-is: no provider
        // tag is attached and the password hash survives.
        assert_eq!(resolved.id, local.id);
        assert!(resolved.provider.is_none());
        assert!(resolved.password_hash.is_some());

        let still_works = identity
            .verify_local("judy@example.com", "local-password")
            .await;
        assert!(still_works.is_ok());
    }

    #[tokio::test]
    async fn test_oauth_only_account_rejects_password_login() {
        let pool = test_pool().await;
        let identity = IdentityResolver::new(pool);

        identity
            .find_or_create_oauth("google", &profile("kim@example.com"))
            .await
            .expect("create oauth user");

        let result = identity.verify_local("kim@example.com", "anything").await;
        assert!(matches!(result, Err(ApiError::InvalidCredentials)));
    }

    // ---- AuthedUser extractor ----

    #[tokio::test]
    async fn test_extractor_rejects_missing_header() {
        let state = app_state_for(test_pool().await);
        let mut parts = request_parts(None, &state);

        let result = AuthedUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_extractor_rejects_tampered_token() {
        let state = app_state_for(test_pool().await);
        state
            .read()
            .await
            .identity
            .register_local("liam@example.com", "hunter22")
            .await
            .expect("register");

        // Signed with a different key: the signature check must fail even
        // though the subject exists.
        let forged = TokenCodec::new("some_other_secret", 15)
            .issue_access("liam@example.com")
            .expect("issue");
        let header = format!("Bearer {}", forged);
        let mut parts = request_parts(Some(&header), &state);

        let result = AuthedUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_extractor_rejects_token_for_deleted_user() {
        let pool = test_pool().await;
        let state = app_state_for(pool.clone());

        let user = state
            .read()
            .await
            .identity
            .register_local("mia@example.com", "hunter22")
            .await
            .expect("register");
        let token = state
            .read()
            .await
            .tokens
            .issue_access("mia@example.com")
            .expect("issue");

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user.id)
            .execute(&pool)
            .await
            .expect("delete user");

        let header = format!("Bearer {}", token);
        let mut parts = request_parts(Some(&header), &state);

        let result = AuthedUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_extractor_resolves_valid_bearer_token() {
        let state = app_state_for(test_pool().await);
        let user = state
            .read()
            .await
            .identity
            .register_local("noah@example.com", "hunter22")
            .await
            .expect("register");
        let token = state
            .read()
            .await
            .tokens
            .issue_access("noah@example.com")
            .expect("issue");

        let header = format!("Bearer {}", token);
        let mut parts = request_parts(Some(&header), &state);

        let authed = AuthedUser::from_request_parts(&mut parts, &())
            .await
            .expect("extract");
        assert_eq!(authed.user.id, user.id);
        assert_eq!(authed.user.username, "noah@example.com");
    }

    // ---- ProviderRegistry ----

    #[test]
    fn test_unregistered_provider_fails_fast() {
        let registry = ProviderRegistry::new();
        let result = registry.get("facebook");
        match result {
            Err(ApiError::UnsupportedProvider(name)) => assert_eq!(name, "facebook"),
            other => panic!("expected UnsupportedProvider, got {:?}", other.map(|_| ())),
        }
    }
}
