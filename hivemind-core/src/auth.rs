//! Bearer credentials: signed tokens and opaque API keys
//!
//! Two credential forms satisfy the `Authorization: Bearer <opaque>` contract:
//! - **Signed tokens** — HMAC-SHA256 over a base64url JSON claims payload
//!   carrying `{tenant_id, agent_id}`. Compact `payload.signature` format.
//! - **API keys** — opaque `hm_`-prefixed strings matched by SHA-256 hash
//!   against the `api_keys` table. The raw key is shown exactly once at
//!   creation and never persisted.
//!
//! Tenant and agent identity always come from the verified credential; tool
//! arguments are never trusted for either.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::types::AuthContext;

type HmacSha256 = Hmac<Sha256>;

/// Prefix identifying HiveMind API keys in logs and config
pub const API_KEY_PREFIX: &str = "hm_";

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    tenant_id: String,
    agent_id: String,
}

fn sign(secret: &str, payload: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::Auth("invalid signing key".to_string()))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Create a signed bearer token carrying tenant and agent claims
pub fn create_token(secret: &str, tenant_id: &str, agent_id: &str) -> Result<String> {
    let claims = TokenClaims {
        tenant_id: tenant_id.to_string(),
        agent_id: agent_id.to_string(),
    };
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signature = URL_SAFE_NO_PAD.encode(sign(secret, payload.as_bytes())?);
    Ok(format!("{payload}.{signature}"))
}

/// Verify a signed bearer token and extract the caller identity
pub fn decode_token(secret: &str, token: &str) -> Result<AuthContext> {
    let (payload, signature) = token
        .split_once('.')
        .ok_or_else(|| Error::Auth("Invalid token format".to_string()))?;

    let presented = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| Error::Auth("Invalid token signature encoding".to_string()))?;
    let expected = sign(secret, payload.as_bytes())?;

    // Constant-time comparison via the MAC verifier
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::Auth("invalid signing key".to_string()))?;
    mac.update(payload.as_bytes());
    if mac.verify_slice(&presented).is_err() || presented.len() != expected.len() {
        return Err(Error::Auth("Invalid token: signature mismatch".to_string()));
    }

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| Error::Auth("Invalid token payload encoding".to_string()))?;
    let claims: TokenClaims = serde_json::from_slice(&claims_bytes)
        .map_err(|_| Error::Auth("Invalid token claims".to_string()))?;

    if claims.tenant_id.is_empty() {
        return Err(Error::Auth("Token missing required claim: tenant_id".to_string()));
    }
    if claims.agent_id.is_empty() {
        return Err(Error::Auth("Token missing required claim: agent_id".to_string()));
    }

    Ok(AuthContext {
        tenant_id: claims.tenant_id,
        agent_id: claims.agent_id,
    })
}

/// Generate a new API key and its persistable components
///
/// Returns `(raw_key, key_prefix, key_hash)`. Only the prefix (displayable)
/// and the SHA-256 hash are safe to store; the raw key cannot be recovered
/// after this call.
pub fn generate_api_key() -> (String, String, String) {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    let raw_key = format!("{API_KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes));
    let key_prefix = raw_key.chars().take(8).collect();
    let key_hash = hash_api_key(&raw_key);
    (raw_key, key_prefix, key_hash)
}

/// SHA-256 hex digest of a presented API key, for database lookup
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Extract the bearer credential from an Authorization header value
pub fn bearer_credential(header: &str) -> Result<&str> {
    header.strip_prefix("Bearer ").ok_or_else(|| {
        Error::Auth("Missing or invalid Authorization header. Expected 'Bearer <token>'.".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trip() {
        let token = create_token(SECRET, "acme", "agent-7").unwrap();
        let ctx = decode_token(SECRET, &token).unwrap();
        assert_eq!(ctx.tenant_id, "acme");
        assert_eq!(ctx.agent_id, "agent-7");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = create_token(SECRET, "acme", "agent-7").unwrap();
        let mut forged = token.clone();
        forged.replace_range(0..4, "AAAA");
        assert!(decode_token(SECRET, &forged).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_token(SECRET, "acme", "agent-7").unwrap();
        assert!(decode_token("other-secret", &token).is_err());
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(decode_token(SECRET, "not-a-token").is_err());
        assert!(decode_token(SECRET, "a.b.c.d").is_err());
    }

    #[test]
    fn api_key_components() {
        let (raw, prefix, hash) = generate_api_key();
        assert!(raw.starts_with(API_KEY_PREFIX));
        assert_eq!(prefix.len(), 8);
        assert_eq!(hash, hash_api_key(&raw));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn api_keys_are_unique() {
        let (a, _, _) = generate_api_key();
        let (b, _, _) = generate_api_key();
        assert_ne!(a, b);
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(bearer_credential("Bearer abc").unwrap(), "abc");
        assert!(bearer_credential("Basic abc").is_err());
        assert!(bearer_credential("").is_err());
    }
}
