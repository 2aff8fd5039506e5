//! `delete_knowledge` tool: soft-delete an owned item
//!
//! Only the creating agent within the caller's tenant may delete. The row is
//! retained with `deleted_at` set and vanishes from every retrieval surface.

use hivemind_core::{Error, Result};
use serde_json::{json, Value};

use crate::auth::Caller;
use crate::state::AppState;
use crate::tools::{parse_uuid, req_str};

pub async fn handle(state: &AppState, caller: &Caller, args: Value) -> Result<Value> {
    let raw_id = req_str(&args, "id")?;
    let id = parse_uuid(&raw_id, "id")?;

    let deleted = state
        .store
        .soft_delete_item(id, &caller.auth.tenant_id, &caller.auth.agent_id)
        .await?;

    if !deleted {
        // Not owned, other tenant, or nonexistent: all answer identically
        return Err(Error::NotFound(id));
    }

    Ok(json!({
        "id": raw_id,
        "status": "deleted",
        "message": "Knowledge item deleted. The record is retained for audit purposes.",
    }))
}
