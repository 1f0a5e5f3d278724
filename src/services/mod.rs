// Services module - outbound integrations with OAuth2 providers

pub mod google;
pub mod oauth;

pub use google::GoogleProvider;
pub use oauth::{OAuthProvider, OAuthUserProfile, ProviderRegistry};
