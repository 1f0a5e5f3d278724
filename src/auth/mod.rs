//! # Auth Module
//!
//! This module handles the token lifecycle and identity resolution:
//! - JWT access token issuance and verification
//! - Opaque refresh token rotation with single-use store semantics
//! - OAuth2 state management and provider-brokered login
//! - Find-or-create identity resolution for local and OAuth2 accounts
//! - AuthedUser extractor for protected routes

pub mod extractors;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod routes;
pub mod store;
pub mod tokens;

#[cfg(test)]
mod tests;

pub use extractors::AuthedUser;
pub use models::User;
pub use routes::auth_routes;
