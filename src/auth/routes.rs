//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /api/auth/register` - Create a local-password account
/// - `POST /api/auth/login` - Verify local credentials
/// - `POST /api/auth/refresh` - Rotate a refresh token
/// - `POST /api/auth/logout` - Revoke a refresh token
/// - `GET /api/auth/oauth2/authorize/:provider` - Start an OAuth2 flow
/// - `GET /api/auth/oauth2/callback/:provider` - Complete an OAuth2 flow
/// - `GET /api/me` - Current authenticated user
pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/refresh", post(handlers::refresh))
        .route("/api/auth/logout", post(handlers::logout))
        .route(
            "/api/auth/oauth2/authorize/:provider",
            get(handlers::oauth2_authorize),
        )
        .route(
            "/api/auth/oauth2/callback/:provider",
            get(handlers::oauth2_callback),
        )
        .route("/api/me", get(handlers::me_handler))
}
