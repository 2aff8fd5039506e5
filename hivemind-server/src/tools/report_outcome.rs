//! `report_outcome` tool: explicit usefulness feedback
//!
//! The primary driver of quality-score evolution: agents report whether a
//! retrieved item actually helped. Repeat reports for the same (item, run)
//! are idempotent - the existing signal is returned instead of a new row.

use chrono::Utc;
use hivemind_core::types::{QualitySignal, SignalType};
use hivemind_core::{Error, Result};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::Caller;
use crate::state::AppState;
use crate::tools::{opt_str, parse_uuid, req_str};

pub async fn handle(state: &AppState, caller: &Caller, args: Value) -> Result<Value> {
    let raw_item_id = req_str(&args, "item_id")?;
    let outcome = req_str(&args, "outcome")?;
    let run_id = opt_str(&args, "run_id");

    let (signal_type, helpful) = match outcome.as_str() {
        "solved" => (SignalType::OutcomeSolved, true),
        "did_not_help" => (SignalType::OutcomeNotHelpful, false),
        other => {
            return Err(Error::Validation(format!(
                "Invalid outcome '{other}'. Must be one of: did_not_help, solved"
            )));
        }
    };

    let item_id = parse_uuid(&raw_item_id, "item_id")?;

    // The item must exist and be visible to this tenant before any signal is
    // recorded; cross-tenant rows answer like missing rows
    if state
        .store
        .get_item(item_id, &caller.auth.tenant_id)
        .await?
        .is_none()
    {
        return Err(Error::NotFound(item_id));
    }

    // Idempotency: one outcome signal per (item, run)
    if let Some(run_id) = &run_id {
        if let Some(existing) = state.store.find_outcome_signal(item_id, run_id).await? {
            info!(
                "duplicate outcome report: item={item_id} run={run_id} - returning existing signal"
            );
            return Ok(json!({
                "status": "already_recorded",
                "item_id": raw_item_id,
                "outcome": outcome,
                "signal_id": existing.to_string(),
            }));
        }
    }

    let signal = QualitySignal {
        id: Uuid::new_v4(),
        knowledge_item_id: item_id,
        signal_type,
        agent_id: Some(caller.auth.agent_id.clone()),
        run_id: run_id.clone(),
        metadata: None,
        created_at: Utc::now(),
    };
    state.store.record_signal(&signal).await?;
    state
        .store
        .increment_outcome_counter(item_id, helpful)
        .await?;

    info!(
        "outcome recorded: item={item_id} outcome={outcome} signal={} run={run_id:?}",
        signal.id
    );

    Ok(json!({
        "status": "recorded",
        "item_id": raw_item_id,
        "outcome": outcome,
        "signal_id": signal.id.to_string(),
    }))
}
