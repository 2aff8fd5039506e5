//! Aggregate statistics endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::resolve_x_api_key;
use crate::errors::ApiError;
use crate::state::AppState;

/// GET /api/v1/stats/commons - commons-wide counters
pub async fn commons(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    resolve_x_api_key(&state, &headers).await?;
    let stats = state.store.commons_stats().await?;
    Ok(Json(json!({
        "total_items": stats.total_items,
        "public_items": stats.public_items,
        "pending_contributions": stats.pending_contributions,
        "total_signals": stats.total_signals,
    })))
}

/// GET /api/v1/stats/org - the calling tenant's counters
pub async fn org(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let caller = resolve_x_api_key(&state, &headers).await?;
    let stats = state.store.tenant_stats(&caller.auth.tenant_id).await?;
    Ok(Json(json!({
        "tenant_id": stats.tenant_id,
        "total_items": stats.total_items,
        "public_items": stats.public_items,
        "pending_contributions": stats.pending_contributions,
        "avg_quality_score": stats.avg_quality_score,
    })))
}

/// GET /api/v1/stats/user - the calling agent's counters
pub async fn user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let caller = resolve_x_api_key(&state, &headers).await?;
    let stats = state
        .store
        .agent_stats(&caller.auth.tenant_id, &caller.auth.agent_id)
        .await?;
    Ok(Json(json!({
        "tenant_id": stats.tenant_id,
        "agent_id": stats.agent_id,
        "contributed_items": stats.contributed_items,
        "helpful_count": stats.helpful_count,
        "not_helpful_count": stats.not_helpful_count,
    })))
}
