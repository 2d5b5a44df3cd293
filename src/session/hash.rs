//! Refresh token hashing.
//!
//! Only a SHA-256 digest of the current refresh token is stored, and digests
//! are compared in constant time.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hex-encoded SHA-256 digest of a refresh token.
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Check a presented refresh token against a stored digest.
pub fn refresh_token_matches(presented: &str, stored_hash: &str) -> bool {
    let presented_hash = hash_refresh_token(presented);
    bool::from(presented_hash.as_bytes().ct_eq(stored_hash.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_hex() {
        let hash = hash_refresh_token("token");
        assert_eq!(hash, hash_refresh_token("token"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_matches_only_same_token() {
        let stored = hash_refresh_token("token-a");
        assert!(refresh_token_matches("token-a", &stored));
        assert!(!refresh_token_matches("token-b", &stored));
        assert!(!refresh_token_matches("token-a", "short"));
    }
}
