//! `list_knowledge` tool: the caller's own contributions

use hivemind_core::types::KnowledgeCategory;
use hivemind_core::{Error, Result};
use hivemind_storage_turso::{decode_cursor, encode_cursor};
use serde_json::{json, Value};

use crate::auth::Caller;
use crate::state::AppState;
use crate::tools::{opt_str, usize_or};

const DEFAULT_LIMIT: usize = 20;

pub async fn handle(state: &AppState, caller: &Caller, args: Value) -> Result<Value> {
    let status = opt_str(&args, "status").unwrap_or_else(|| "all".to_string());
    if !matches!(status.as_str(), "pending" | "approved" | "all") {
        return Err(Error::Validation(format!(
            "Invalid status '{status}'. Valid values: all, approved, pending"
        )));
    }

    let category = opt_str(&args, "category")
        .map(|raw| {
            raw.parse::<KnowledgeCategory>()
                .map_err(|e| Error::Validation(format!("Invalid category: {e}")))
        })
        .transpose()?;

    let limit = usize_or(&args, "limit", DEFAULT_LIMIT).min(state.settings.max_search_limit);
    let offset = opt_str(&args, "cursor").map_or(0, |c| decode_cursor(&c));

    let (contributions, total_count) = state
        .store
        .list_contributions(
            &caller.auth.tenant_id,
            &caller.auth.agent_id,
            &status,
            category,
            limit,
            offset,
        )
        .await?;

    let has_more = ((offset + limit) as i64) < total_count;
    let next_cursor = has_more.then(|| encode_cursor(offset + limit));

    Ok(json!({
        "contributions": contributions.iter().map(|c| json!({
            "id": c.id.to_string(),
            "status": c.status,
            "category": c.category.as_str(),
            "title": c.title,
            "contributed_at": c.contributed_at.to_rfc3339(),
            "is_public": c.is_public,
        })).collect::<Vec<_>>(),
        "total_count": total_count,
        "next_cursor": next_cursor,
    }))
}
