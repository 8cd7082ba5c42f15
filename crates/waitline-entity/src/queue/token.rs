//! Lease token generation.

use uuid::Uuid;

/// Generate a fresh opaque lease token (128 random bits, hex encoded).
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Shorten a token for log output.
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(6).collect();
    format!("{visible}***")
}
