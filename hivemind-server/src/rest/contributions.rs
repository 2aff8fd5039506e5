//! Review endpoints driving the operator UI
//!
//! The queue fetch claims rows (claim-TTL discipline) so two concurrent
//! reviewers never see the same contribution; approving promotes the row
//! into the commons with embedding generation, LSH indexing, and the full
//! notification + webhook fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use hivemind_core::{ingest, Error};
use serde_json::{json, Value};
use tracing::info;

use crate::auth::resolve_x_api_key;
use crate::errors::ApiError;
use crate::state::AppState;
use crate::tools::parse_uuid;

const DEFAULT_REVIEW_BATCH: usize = 20;

/// GET /api/v1/contributions - claim the next batch for review
pub async fn list_for_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let caller = resolve_x_api_key(&state, &headers).await?;

    let limit = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_REVIEW_BATCH);

    let claimed = state
        .store
        .claim_pending_for_review(
            &caller.auth.tenant_id,
            limit,
            state.settings.review_claim_ttl_secs,
        )
        .await?;

    Ok(Json(json!({
        "contributions": claimed.iter().map(|c| json!({
            "id": c.id.to_string(),
            "tenant_id": c.tenant_id,
            "source_agent_id": c.source_agent_id,
            "content": c.content,
            "category": c.category.as_str(),
            "confidence": c.confidence,
            "tags": c.tags,
            "contributed_at": c.contributed_at.to_rfc3339(),
            "is_sensitive_flagged": c.is_sensitive_flagged,
        })).collect::<Vec<_>>(),
        "count": claimed.len(),
    })))
}

/// POST /api/v1/contributions/{id}/approve - promote into the commons
pub async fn approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let caller = resolve_x_api_key(&state, &headers).await?;
    let pending_id = parse_uuid(&id, "id")?;

    let pending = state
        .store
        .get_pending(pending_id, &caller.auth.tenant_id)
        .await?
        .ok_or(Error::NotFound(pending_id))?;

    let item_id = ingest::promote_pending(&state.ingest_context(), &pending).await?;

    info!("contribution {pending_id} approved as item {item_id}");
    Ok(Json(json!({
        "contribution_id": id,
        "knowledge_item_id": item_id.to_string(),
        "status": "approved",
    })))
}

/// POST /api/v1/contributions/{id}/reject - discard from the queue
pub async fn reject(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let caller = resolve_x_api_key(&state, &headers).await?;
    let pending_id = parse_uuid(&id, "id")?;

    // Scope the lookup to the caller's tenant before destroying anything
    state
        .store
        .get_pending(pending_id, &caller.auth.tenant_id)
        .await?
        .ok_or(Error::NotFound(pending_id))?;

    state.store.delete_pending(pending_id).await?;

    info!("contribution {pending_id} rejected");
    Ok(Json(json!({
        "contribution_id": id,
        "status": "rejected",
    })))
}
