//! `add_knowledge` tool: contribute a knowledge item

use hivemind_core::ingest::{self, IngestRequest};
use hivemind_core::{Operation, Result};
use serde_json::{json, Value};

use crate::auth::{check_tier_quota, Caller};
use crate::state::AppState;
use crate::tools::{f32_or, opt_str, opt_str_list, req_str};

pub async fn handle(state: &AppState, caller: &Caller, args: Value) -> Result<Value> {
    check_tier_quota(state, caller, Operation::Contribute)?;

    let request = IngestRequest {
        content: req_str(&args, "content")?,
        category: req_str(&args, "category")?,
        confidence: f32_or(&args, "confidence", 0.8),
        framework: opt_str(&args, "framework"),
        language: opt_str(&args, "language"),
        version: opt_str(&args, "version"),
        tags: opt_str_list(&args, "tags"),
        run_id: opt_str(&args, "run_id"),
    };

    let outcome = ingest::add_knowledge(&state.ingest_context(), &caller.auth, request).await?;

    let mut response = json!({
        "contribution_id": outcome.contribution_id.to_string(),
        "status": outcome.status.as_str(),
        "category": outcome.category.as_str(),
        "message": outcome.message,
    });
    if let Some(duplicate_of) = outcome.duplicate_of {
        response["duplicate_of"] = json!(duplicate_of.to_string());
    }
    Ok(response)
}
