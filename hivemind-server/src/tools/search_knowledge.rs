//! `search_knowledge` tool: hybrid search or single-item fetch
//!
//! Search mode (query provided) embeds the query once and runs the hybrid
//! BM25+vector RRF ranking in one SQL statement, then records retrieval
//! signals in a fire-and-forget task. Fetch mode (id provided) returns the
//! full item with content-hash integrity verification; a mismatch attaches
//! `integrity_warning` instead of failing the read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hivemind_core::storage::{KnowledgeStore, SearchRequest};
use hivemind_core::types::{KnowledgeCategory, KnowledgeItem, QualitySignal, SignalType};
use hivemind_core::{verify_content_hash, Error, Operation, Result};
use hivemind_storage_turso::decode_cursor;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::auth::{check_tier_quota, Caller};
use crate::state::AppState;
use crate::tools::{opt_str, parse_uuid, usize_or};

pub async fn handle(state: &AppState, caller: &Caller, args: Value) -> Result<Value> {
    check_tier_quota(state, caller, Operation::Search)?;

    let query = opt_str(&args, "query");
    let id = opt_str(&args, "id");

    if query.is_none() && id.is_none() {
        return Err(Error::Validation(
            "Provide either 'query' for search or 'id' to fetch a specific item.".to_string(),
        ));
    }

    if let Some(id) = id {
        return fetch_by_id(state, caller, &id).await;
    }

    search(state, caller, &args, query.unwrap_or_default()).await
}

/// Fetch mode: full item with tenant isolation and hash verification
async fn fetch_by_id(state: &AppState, caller: &Caller, id: &str) -> Result<Value> {
    let item_id = parse_uuid(id, "id")?;

    let Some(item) = state.store.get_item(item_id, &caller.auth.tenant_id).await? else {
        // Cross-tenant rows answer exactly like missing rows
        return Err(Error::NotFound(item_id));
    };

    let mut response = full_item_json(&item);

    if verify_content_hash(&item.content, &item.content_hash) {
        response["integrity_verified"] = json!(true);
    } else {
        // A tampered row is an integrity incident, not a caller error: log it
        // and still return the content with an explicit warning
        warn!("content hash mismatch for item {} - possible tampering detected", item.id);
        response["integrity_warning"] =
            json!("Content hash mismatch detected - this item may have been tampered with.");
    }

    Ok(response)
}

/// Search mode: hybrid RRF with quality boosting and summary-tier results
async fn search(state: &AppState, caller: &Caller, args: &Value, query: String) -> Result<Value> {
    let limit = usize_or(args, "limit", state.settings.default_search_limit)
        .min(state.settings.max_search_limit);
    let offset = opt_str(args, "cursor").map_or(0, |c| decode_cursor(&c));

    let category = opt_str(args, "category")
        .map(|raw| {
            raw.parse::<KnowledgeCategory>()
                .map_err(|e| Error::Validation(format!("Invalid category: {e}")))
        })
        .transpose()?;

    let at_time = opt_str(args, "at_time")
        .map(|raw| {
            raw.parse::<DateTime<Utc>>().map_err(|_| {
                Error::Validation(format!(
                    "Invalid at_time format: '{raw}'. Expected ISO 8601 datetime string, \
                     e.g. '2026-01-01T00:00:00Z'."
                ))
            })
        })
        .transpose()?;

    let request = SearchRequest {
        embedding: state.embedder.embed(&query),
        query,
        tenant_id: caller.auth.tenant_id.clone(),
        category,
        limit,
        offset,
        at_time,
        version: opt_str(args, "version"),
    };

    let page = state.store.search_knowledge(&request).await?;

    // Retrieval tracking runs after the response is built and never affects it
    let returned_ids: Vec<Uuid> = page.results.iter().map(|r| r.id).collect();
    if !returned_ids.is_empty() {
        let store = Arc::clone(&state.store);
        let agent_id = caller.auth.agent_id.clone();
        tokio::spawn(async move {
            record_retrieval_signals(store.as_ref(), &returned_ids, &agent_id).await;
        });
    }

    Ok(json!({
        "results": page.results.iter().map(|r| json!({
            "id": r.id.to_string(),
            "title": r.title,
            "category": r.category.as_str(),
            "confidence": r.confidence,
            "tenant_attribution": r.tenant_attribution,
            "relevance_score": r.relevance_score,
        })).collect::<Vec<_>>(),
        "total_found": page.total_found,
        "next_cursor": page.next_cursor,
    }))
}

/// Batch-increment retrieval counters and append retrieval signals
///
/// Best-effort: failures are logged and never surface to the search caller.
async fn record_retrieval_signals(
    store: &(impl KnowledgeStore + ?Sized),
    item_ids: &[Uuid],
    agent_id: &str,
) {
    if let Err(e) = store.increment_retrieval_counts(item_ids).await {
        warn!("failed to record retrieval counts for {} items: {e}", item_ids.len());
        return;
    }

    let now = Utc::now();
    for &item_id in item_ids {
        let signal = QualitySignal {
            id: Uuid::new_v4(),
            knowledge_item_id: item_id,
            signal_type: SignalType::Retrieval,
            agent_id: Some(agent_id.to_string()),
            run_id: None,
            metadata: None,
            created_at: now,
        };
        if let Err(e) = store.record_signal(&signal).await {
            warn!("failed to record retrieval signal for {item_id}: {e}");
        }
    }
}

/// Shared JSON projection for a full item (REST mirror reuse)
pub fn full_item_json(item: &KnowledgeItem) -> Value {
    json!({
        "id": item.id.to_string(),
        "content": item.content,
        "category": item.category.as_str(),
        "confidence": item.confidence,
        "framework": item.framework,
        "language": item.language,
        "version": item.version,
        "tags": item.tags,
        "tenant_attribution": item.tenant_id,
        "contributed_at": item.contributed_at.to_rfc3339(),
    })
}
