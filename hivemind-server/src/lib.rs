//! # HiveMind Server
//!
//! Transport and lifecycle shell around the knowledge engine:
//! - `POST /rpc` - the tool surface (bearer credential)
//! - `/api/v1/*` - REST mirror, review endpoints, stats, SSE feed
//!   (`X-API-Key` credential)
//! - `/.well-known/mcp/server-card.json` - discovery document
//! - webhook delivery worker and background quality jobs

pub mod auth;
pub mod errors;
pub mod rest;
pub mod rpc;
pub mod scheduler;
pub mod state;
pub mod tools;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Assemble the full application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rpc", post(rpc::handle_rpc))
        .nest("/api/v1", rest::router())
        .route(
            "/.well-known/mcp/server-card.json",
            get(rest::well_known::server_card),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
