//! `publish_knowledge` tool: toggle an item's commons visibility
//!
//! Reversible: publishing exposes the item to all tenants' searches,
//! unpublishing restricts it back to its own tenant.

use hivemind_core::{Error, Result};
use serde_json::{json, Value};

use crate::auth::Caller;
use crate::state::AppState;
use crate::tools::{parse_uuid, req_str};

pub async fn handle(state: &AppState, caller: &Caller, args: Value) -> Result<Value> {
    let raw_id = req_str(&args, "id")?;
    let id = parse_uuid(&raw_id, "id")?;
    let is_public = args
        .get("is_public")
        .and_then(Value::as_bool)
        .ok_or_else(|| Error::Validation("Missing 'is_public' parameter.".to_string()))?;

    let updated = state
        .store
        .set_item_public(id, &caller.auth.tenant_id, &caller.auth.agent_id, is_public)
        .await?;

    if !updated {
        return Err(Error::NotFound(id));
    }

    let message = if is_public {
        "Knowledge item published to the public commons."
    } else {
        "Knowledge item restricted to your tenant."
    };

    Ok(json!({
        "id": raw_id,
        "is_public": is_public,
        "message": message,
    }))
}
