//! Server-side credential resolution
//!
//! Two credential forms reach the server:
//! - `Authorization: Bearer <token-or-hm_key>` on the RPC surface
//! - `X-API-Key: <hm_key>` on the REST mirror
//!
//! Signed tokens resolve directly to a caller identity. API keys resolve via
//! their SHA-256 hash against the key table, roll the billing window when it
//! has lapsed, and count the request. The tenant and agent identity ALWAYS
//! come from the credential; request bodies and query strings are never
//! trusted for either.

use axum::http::HeaderMap;
use chrono::Utc;
use hivemind_core::types::Tier;
use hivemind_core::{auth, AuthContext, Error, Result};
use uuid::Uuid;

use crate::state::AppState;

/// Resolved caller: identity plus quota context when an API key was used
#[derive(Debug, Clone)]
pub struct Caller {
    pub auth: AuthContext,
    /// Billing tier; `None` for signed-token callers (no tier quotas)
    pub tier: Option<Tier>,
    pub api_key_id: Option<Uuid>,
}

/// Resolve the RPC-surface `Authorization` header
pub async fn resolve_bearer(state: &AppState, headers: &HeaderMap) -> Result<Caller> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let credential = auth::bearer_credential(header)?;

    if credential.starts_with(auth::API_KEY_PREFIX) {
        resolve_api_key(state, credential).await
    } else {
        let ctx = auth::decode_token(&state.settings.secret_key, credential)?;
        Ok(Caller {
            auth: ctx,
            tier: None,
            api_key_id: None,
        })
    }
}

/// Resolve the REST-mirror `X-API-Key` header
pub async fn resolve_x_api_key(state: &AppState, headers: &HeaderMap) -> Result<Caller> {
    let raw = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Auth("Missing X-API-Key header.".to_string()))?;
    resolve_api_key(state, raw).await
}

/// Validate an `hm_`-prefixed key and produce the caller context
async fn resolve_api_key(state: &AppState, raw_key: &str) -> Result<Caller> {
    let key_hash = auth::hash_api_key(raw_key);
    let record = state
        .store
        .find_api_key_by_hash(&key_hash)
        .await?
        .ok_or_else(|| Error::Auth("Invalid API key.".to_string()))?;

    if !record.is_active {
        return Err(Error::Auth("API key has been revoked.".to_string()));
    }

    // Roll the billing window when it has lapsed
    let now = Utc::now();
    let billing_age_days = (now - record.billing_period_start).num_days();
    if billing_age_days >= record.billing_period_reset_days {
        state.store.reset_billing_period(record.id, now).await?;
    }

    // Usage counting is best-effort accounting on the request path
    state.store.increment_request_count(record.id, now).await?;

    Ok(Caller {
        auth: AuthContext {
            tenant_id: record.tenant_id,
            agent_id: record.agent_id,
        },
        tier: Some(record.tier),
        api_key_id: Some(record.id),
    })
}

/// Enforce the caller's per-minute tier quota for an operation
///
/// Signed-token callers carry no tier and are not quota-limited here; the
/// burst gate still applies to their contributions.
pub fn check_tier_quota(
    state: &AppState,
    caller: &Caller,
    operation: hivemind_core::Operation,
) -> Result<()> {
    if let Some(tier) = caller.tier {
        let exceeded = state.gate.check_quota(
            operation,
            tier,
            &caller.auth.tenant_id,
            &caller.auth.agent_id,
        );
        if exceeded {
            return Err(Error::QuotaExceeded(format!(
                "Rate limit exceeded for your {} tier. Please slow down.",
                tier.as_str()
            )));
        }
    }
    Ok(())
}
