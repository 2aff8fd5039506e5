//! Well-known discovery document

use axum::Json;
use serde_json::{json, Value};

use crate::tools::TOOL_NAMES;

/// GET /.well-known/mcp/server-card.json
///
/// Unauthenticated discovery document naming the tool surface and the
/// credential schemes the server accepts.
pub async fn server_card() -> Json<Value> {
    Json(json!({
        "name": "HiveMind",
        "description": "Multi-tenant knowledge commons for autonomous agents",
        "version": env!("CARGO_PKG_VERSION"),
        "tools": TOOL_NAMES,
        "endpoints": {
            "rpc": "/rpc",
            "rest": "/api/v1",
            "stream": "/api/v1/stream/feed",
        },
        "authentication": {
            "rpc": "Authorization: Bearer <signed-token or hm_ API key>",
            "rest": "X-API-Key: <hm_ API key>",
        },
    }))
}
