//! Content integrity hashing
//!
//! Every stored knowledge item carries the hex SHA-256 of its (sanitized)
//! content. Single-item fetches verify the hash and surface a mismatch as an
//! `integrity_warning` on the response rather than failing the read.

use sha2::{Digest, Sha256};

/// Compute the hex SHA-256 digest of the content's UTF-8 bytes
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Verify stored content against its recorded hash
pub fn verify_content_hash(content: &str, stored_hash: &str) -> bool {
    compute_content_hash(content) == stored_hash
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        // SHA-256 of the empty string
        assert_eq!(
            compute_content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn verify_round_trip() {
        let content = "Use exponential backoff when the API returns 429.";
        let hash = compute_content_hash(content);
        assert!(verify_content_hash(content, &hash));
        assert!(!verify_content_hash("tampered", &hash));
    }

    #[test]
    fn digest_is_lowercase_hex_64() {
        let hash = compute_content_hash("anything");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
