//! src/utils.rs
//! Shared utility functions used across the codebase

use sha2::{Digest, Sha256};

/// Truncate a string to at most `max_chars` characters with ellipsis.
///
/// Counts characters rather than bytes so multi-byte text never splits.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}...", &s[..idx]),
    }
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(bytes.as_ref());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Short prefix of a secret token, safe for logs.
pub fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(8) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}
