// src/common/rand_token.rs
//! Opaque credential string generator
//!
//! Refresh tokens are lookup keys, not verifiable claim sets, so they are
//! plain random strings drawn from an unambiguous alphanumeric alphabet.

use rand::Rng;

/// Alphabet for opaque tokens: upper, lower, digits (62 symbols)
const TOKEN_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of every refresh token issued by this service
pub const REFRESH_TOKEN_LEN: usize = 64;

/// Generate a random alphanumeric string of the given length
pub fn generate_raw_token(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..TOKEN_ALPHABET.len());
            TOKEN_ALPHABET[idx] as char
        })
        .collect()
}

/// Generate an opaque refresh token
pub fn generate_refresh_token() -> String {
    generate_raw_token(REFRESH_TOKEN_LEN)
}

/// Structural check for a value that claims to be one of our refresh tokens.
/// Existence is the store's concern; this only rejects garbage early.
pub fn is_refresh_token_shaped(token: &str) -> bool {
    token.len() == REFRESH_TOKEN_LEN && token.bytes().all(|b| b.is_ascii_alphanumeric())
}
