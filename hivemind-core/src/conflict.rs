//! LLM-assisted conflict resolution
//!
//! Invoked only when the dedup pipeline confirms a DUPLICATE. The resolver
//! classifies the relationship between the new content and the existing item,
//! then the application step executes the matching storage action:
//!
//!   UPDATE             — new supersedes existing (expire old, insert new)
//!   ADD                — items coexist (insert new, old untouched)
//!   NOOP               — new adds nothing (block insert, report duplicate)
//!   VERSION_FORK       — both valid for different version scopes
//!                        (world-time split)
//!   FLAGGED_FOR_REVIEW — multi-hop conflict; human review required
//!
//! Fallbacks are permissive: no LLM, an API failure, or a malformed reply all
//! resolve to ADD so the contribution is never blocked by the resolver itself.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm::{parse_json_reply, LlmClient};
use crate::storage::KnowledgeStore;
use crate::Result;

const CONFLICT_PROMPT: &str = "You are a knowledge conflict resolver. Compare NEW knowledge with \
EXISTING knowledge and determine the appropriate action. Respond with JSON only - no explanation \
outside the JSON:\n\n\
{\"action\": \"UPDATE\" | \"ADD\" | \"NOOP\" | \"VERSION_FORK\", \"reason\": string, \"is_direct_conflict\": bool}\n\n\
Rules:\n\
- UPDATE: New knowledge supersedes existing (newer version, corrected info, better explanation)\n\
- ADD: New knowledge is distinct enough to coexist (different angle, complementary perspective)\n\
- NOOP: New knowledge adds nothing beyond existing (exact or near-exact semantic duplicate)\n\
- VERSION_FORK: Both are valid but for different versions/contexts\n\
- Only resolve DIRECT single-hop conflicts. If the conflict involves multi-hop reasoning across \
multiple items, set is_direct_conflict=false.\n\n";

/// Resolver outcome vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    Update,
    Add,
    Noop,
    VersionFork,
    FlaggedForReview,
}

impl ConflictAction {
    fn from_llm(value: &str) -> Option<Self> {
        match value {
            "UPDATE" => Some(ConflictAction::Update),
            "ADD" => Some(ConflictAction::Add),
            "NOOP" => Some(ConflictAction::Noop),
            "VERSION_FORK" => Some(ConflictAction::VersionFork),
            _ => None,
        }
    }
}

/// Classification result for a confirmed near-duplicate
#[derive(Debug, Clone)]
pub struct ConflictResolution {
    pub action: ConflictAction,
    pub reason: String,
    pub is_direct_conflict: bool,
    pub existing_item_id: Uuid,
}

impl ConflictResolution {
    fn fallback_add(existing_item_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            action: ConflictAction::Add,
            reason: reason.into(),
            is_direct_conflict: true,
            existing_item_id,
        }
    }
}

/// Side-effects applied for a resolution
#[derive(Debug, Clone)]
pub struct AppliedResolution {
    pub applied: ConflictAction,
    /// World-time start for the new item after a VERSION_FORK
    pub valid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct LlmResolution {
    #[serde(default)]
    action: String,
    #[serde(default)]
    reason: String,
    #[serde(default = "default_true")]
    is_direct_conflict: bool,
}

fn default_true() -> bool {
    true
}

/// Classify the relationship between new content and an existing near-duplicate
pub async fn resolve_conflict(
    llm: Option<&LlmClient>,
    new_content: &str,
    existing_item_id: Uuid,
    existing_content: &str,
) -> ConflictResolution {
    let Some(llm) = llm else {
        debug!("conflict resolver: no API key configured - defaulting to ADD");
        return ConflictResolution::fallback_add(
            existing_item_id,
            "No LLM API key configured - defaulting to ADD",
        );
    };

    let prompt = format!(
        "{CONFLICT_PROMPT}NEW KNOWLEDGE:\n{new_content}\n\nEXISTING KNOWLEDGE:\n{existing_content}"
    );

    let raw = match llm.complete(&prompt, 256).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("conflict resolver: LLM call failed - defaulting to ADD: {e}");
            return ConflictResolution::fallback_add(
                existing_item_id,
                format!("LLM API error: {e} - defaulting to ADD"),
            );
        }
    };

    let Some(parsed) = parse_json_reply::<LlmResolution>(&raw) else {
        warn!("conflict resolver: failed to parse LLM reply - defaulting to ADD");
        return ConflictResolution::fallback_add(
            existing_item_id,
            "Parse error - defaulting to ADD",
        );
    };

    let action = match ConflictAction::from_llm(&parsed.action.to_uppercase()) {
        Some(action) => action,
        None => {
            warn!(
                "conflict resolver: unexpected action '{}' - defaulting to ADD",
                parsed.action
            );
            ConflictAction::Add
        }
    };

    // Multi-hop conflicts go to human review regardless of the claimed action
    if !parsed.is_direct_conflict {
        info!(
            "conflict resolver: multi-hop conflict detected - flagging for review \
             (existing_item={existing_item_id})"
        );
        return ConflictResolution {
            action: ConflictAction::FlaggedForReview,
            reason: parsed.reason,
            is_direct_conflict: false,
            existing_item_id,
        };
    }

    ConflictResolution {
        action,
        reason: parsed.reason,
        is_direct_conflict: true,
        existing_item_id,
    }
}

/// Execute the storage side-effects of a resolution
///
/// UPDATE expires the existing item (system time); VERSION_FORK invalidates it
/// (world time) and returns the `valid_at` the new item must carry. ADD, NOOP,
/// and FLAGGED_FOR_REVIEW mutate nothing here.
pub async fn apply_conflict_resolution(
    store: &dyn KnowledgeStore,
    resolution: &ConflictResolution,
    tenant_id: &str,
) -> Result<AppliedResolution> {
    let now = Utc::now();

    match resolution.action {
        ConflictAction::Update => {
            store
                .supersede_item(resolution.existing_item_id, tenant_id, now)
                .await?;
            info!(
                "conflict resolver: UPDATE applied - expired item {} (tenant={tenant_id})",
                resolution.existing_item_id
            );
            Ok(AppliedResolution {
                applied: ConflictAction::Update,
                valid_at: None,
            })
        }
        ConflictAction::VersionFork => {
            store
                .invalidate_item(resolution.existing_item_id, tenant_id, now)
                .await?;
            info!(
                "conflict resolver: VERSION_FORK applied - invalidated item {} (tenant={tenant_id})",
                resolution.existing_item_id
            );
            Ok(AppliedResolution {
                applied: ConflictAction::VersionFork,
                valid_at: Some(now),
            })
        }
        ConflictAction::Noop => {
            info!(
                "conflict resolver: NOOP - blocking duplicate contribution (existing={}, tenant={tenant_id})",
                resolution.existing_item_id
            );
            Ok(AppliedResolution {
                applied: ConflictAction::Noop,
                valid_at: None,
            })
        }
        ConflictAction::Add | ConflictAction::FlaggedForReview => {
            debug!(
                "conflict resolver: {:?} - no storage changes, new item proceeds",
                resolution.action
            );
            Ok(AppliedResolution {
                applied: resolution.action,
                valid_at: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_action_vocabulary() {
        assert_eq!(ConflictAction::from_llm("UPDATE"), Some(ConflictAction::Update));
        assert_eq!(ConflictAction::from_llm("VERSION_FORK"), Some(ConflictAction::VersionFork));
        assert_eq!(ConflictAction::from_llm("DELETE"), None);
    }

    #[test]
    fn parse_resolution_defaults() {
        let parsed: LlmResolution = parse_json_reply(r#"{"action": "NOOP"}"#).unwrap();
        assert_eq!(parsed.action, "NOOP");
        assert!(parsed.is_direct_conflict);
    }

    #[tokio::test]
    async fn no_llm_defaults_to_add() {
        let id = Uuid::new_v4();
        let resolution = resolve_conflict(None, "new", id, "existing").await;
        assert_eq!(resolution.action, ConflictAction::Add);
        assert_eq!(resolution.existing_item_id, id);
        assert!(resolution.is_direct_conflict);
    }
}
