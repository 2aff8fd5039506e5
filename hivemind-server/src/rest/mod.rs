//! REST mirror under `/api/v1`
//!
//! Mirrors the RPC tool surface for HTTP clients authenticating with
//! `X-API-Key`, and adds the review endpoints, aggregate stats, the SSE
//! feed, and the well-known discovery document.

pub mod contributions;
pub mod stats;
pub mod stream;
pub mod well_known;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::auth::resolve_x_api_key;
use crate::errors::ApiError;
use crate::state::AppState;
use crate::tools;

/// Build the `/api/v1` router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/knowledge", get(search_knowledge).post(add_knowledge))
        .route("/knowledge/{id}", get(get_knowledge_item))
        .route("/outcomes", post(report_outcome))
        .route("/contributions", get(contributions::list_for_review))
        .route(
            "/contributions/{id}/approve",
            post(contributions::approve),
        )
        .route("/contributions/{id}/reject", post(contributions::reject))
        .route("/stats/commons", get(stats::commons))
        .route("/stats/org", get(stats::org))
        .route("/stats/user", get(stats::user))
        .route("/stream/feed", get(stream::feed))
}

/// GET /api/v1/knowledge - search mode of the search tool
async fn search_knowledge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let caller = resolve_x_api_key(&state, &headers).await?;
    let args = query_to_args(&params);
    let result = tools::search_knowledge::handle(&state, &caller, args).await?;
    Ok(Json(result))
}

/// GET /api/v1/knowledge/{id} - fetch mode with integrity verification
async fn get_knowledge_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let caller = resolve_x_api_key(&state, &headers).await?;
    let result =
        tools::search_knowledge::handle(&state, &caller, json!({ "id": id })).await?;
    Ok(Json(result))
}

/// POST /api/v1/knowledge - contribute
async fn add_knowledge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let caller = resolve_x_api_key(&state, &headers).await?;
    let result = tools::add_knowledge::handle(&state, &caller, body).await?;
    Ok(Json(result))
}

/// POST /api/v1/outcomes - usage-outcome feedback
async fn report_outcome(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let caller = resolve_x_api_key(&state, &headers).await?;
    let result = tools::report_outcome::handle(&state, &caller, body).await?;
    Ok(Json(result))
}

/// Lift query-string parameters into tool arguments, typing the numerics
fn query_to_args(params: &HashMap<String, String>) -> Value {
    let mut args = serde_json::Map::new();
    for (key, value) in params {
        let typed = match key.as_str() {
            "limit" => value
                .parse::<u64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::from(value.clone())),
            _ => Value::from(value.clone()),
        };
        args.insert(key.clone(), typed);
    }
    Value::Object(args)
}
