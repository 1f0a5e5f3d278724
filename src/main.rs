// src/main.rs
use axum::{extract::Extension, Router};
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::env;
use std::path::PathBuf;
use std::{net::SocketAddr, str::FromStr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod common;
mod services;

use auth::identity::IdentityResolver;
use auth::store::{OAuthStateStore, RefreshTokenStore};
use auth::tokens::TokenCodec;
use common::AppState;
use services::{GoogleProvider, ProviderRegistry};

/// Interval between expiry sweeps of refresh tokens and OAuth2 states
const SWEEP_INTERVAL_SECS: u64 = 600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://storefront_auth.db".to_string());
    let jwt_secret =
        env::var("JWT_SECRET").unwrap_or_else(|_| "replace_with_strong_secret".to_string());
    let access_ttl_minutes = env::var("ACCESS_TOKEN_TTL_MINUTES")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(15);
    let refresh_ttl_days = env::var("REFRESH_TOKEN_TTL_DAYS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(14);
    let state_ttl_minutes = env::var("OAUTH_STATE_TTL_MINUTES")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(5);
    let redirect_base =
        env::var("OAUTH_REDIRECT_BASE").unwrap_or_else(|_| "http://localhost:8080".to_string());

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    if let Some(path_part) = database_url.strip_prefix("sqlite://") {
        let path_without_params = path_part.split('?').next().unwrap_or("");
        if !path_without_params.is_empty() && !path_without_params.starts_with(':') {
            let db_path = PathBuf::from(path_without_params);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let connect_options = SqliteConnectOptions::from_str(&database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await?;

    common::migrations::run_migrations(&pool).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let tokens = Arc::new(TokenCodec::new(&jwt_secret, access_ttl_minutes));
    let refresh_tokens = Arc::new(RefreshTokenStore::new(pool.clone(), refresh_ttl_days));
    let oauth_states = Arc::new(OAuthStateStore::new(pool.clone(), state_ttl_minutes));
    let identity = Arc::new(IdentityResolver::new(pool.clone()));

    let mut registry = ProviderRegistry::new();
    match (env::var("GOOGLE_CLIENT_ID"), env::var("GOOGLE_CLIENT_SECRET")) {
        (Ok(client_id), Ok(client_secret)) => {
            let redirect_uri = format!("{}/api/auth/oauth2/callback/google", redirect_base);
            registry.register(
                "google",
                Arc::new(GoogleProvider::new(client_id, client_secret, redirect_uri)),
            );
            info!("Registered OAuth2 provider: google");
        }
        _ => {
            warn!("GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set; OAuth2 login disabled");
        }
    }
    let providers = Arc::new(registry);

    // Background expiry sweep keeps the single-use tables from accumulating
    // rows that check-on-read would otherwise only reject lazily.
    {
        let refresh_tokens = refresh_tokens.clone();
        let oauth_states = oauth_states.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match refresh_tokens.sweep_expired().await {
                    Ok(n) if n > 0 => info!(removed = n, "Swept expired refresh tokens"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Refresh token sweep failed"),
                }
                match oauth_states.sweep_expired().await {
                    Ok(n) if n > 0 => info!(removed = n, "Swept expired OAuth2 states"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "OAuth2 state sweep failed"),
                }
            }
        });
    }

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let app_state = AppState {
        db: pool,
        tokens,
        refresh_tokens,
        oauth_states,
        identity,
        providers,
    };

    let shared = Arc::new(RwLock::new(app_state));

    // ========================================================================
    // ROUTER COMPOSITION
    // ========================================================================

    let app = Router::new()
        .merge(auth::auth_routes())
        .layer(Extension(shared.clone()))
        .layer({
            let cors_origins = std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".to_string());

            let origins: Vec<axum::http::HeaderValue> = cors_origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                ])
                .allow_credentials(true)
        })
        .layer(TraceLayer::new_for_http());

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
