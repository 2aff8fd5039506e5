//! RPC tool endpoint
//!
//! `POST /rpc` with `{"tool": <name>, "arguments": {...}}` and a bearer
//! credential. Failures come back as the `{isError: true, text}` envelope
//! with HTTP 200 - transport success, tool failure - mirroring tool-call
//! semantics rather than REST semantics.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::resolve_bearer;
use crate::errors::caller_text;
use crate::state::AppState;
use crate::tools;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Handle one tool invocation
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RpcRequest>,
) -> Json<Value> {
    debug!("rpc: tool={}", request.tool);

    let caller = match resolve_bearer(&state, &headers).await {
        Ok(caller) => caller,
        Err(e) => return error_envelope(&e),
    };

    match tools::dispatch(&state, &caller, &request.tool, request.arguments).await {
        Ok(result) => Json(result),
        Err(e) => error_envelope(&e),
    }
}

fn error_envelope(err: &hivemind_core::Error) -> Json<Value> {
    Json(json!({
        "isError": true,
        "text": caller_text(err),
    }))
}
