//! Ingestion orchestration: the add-knowledge flow
//!
//! Drives the contribution pipeline in fixed order, each step short-circuiting
//! on rejection:
//!
//!   1. Validate length, confidence, and category
//!   2. Caller identity comes from the verified credential (never arguments)
//!   3. Injection scan on the RAW text
//!   4. Anti-sybil burst gate
//!   5. PII strip (rejecting >50% redaction)
//!   6. Content hash of the cleaned text
//!   7. Dedup pipeline; on DUPLICATE, conflict resolution + side effects
//!   8. Auto-approve rule match inserts directly into the commons
//!      (embedding, LSH index, notification, webhooks)
//!   9. Otherwise the contribution is quarantined in the pending queue
//!
//! Raw content is never persisted: by the time anything is written, only the
//! sanitized text exists.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::conflict::{apply_conflict_resolution, resolve_conflict, ConflictAction};
use crate::config::Settings;
use crate::dedup::{run_dedup_pipeline, DedupAction, MinHashLshIndex};
use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::integrity::compute_content_hash;
use crate::llm::LlmClient;
use crate::notify::{KnowledgePublished, NotificationHub};
use crate::pipeline::{InjectionScanner, PiiSanitizer};
use crate::quality::scorer::initial_quality_score;
use crate::ratelimit::RateGate;
use crate::storage::KnowledgeStore;
use crate::types::{AuthContext, KnowledgeCategory, KnowledgeItem, PendingContribution};
use crate::webhooks::{WebhookDispatcher, EVENT_KNOWLEDGE_APPROVED};

/// Minimum accepted content length in characters
const MIN_CONTENT_LENGTH: usize = 10;

/// Everything the ingestion flow needs, borrowed from the process singletons
pub struct IngestContext<'a> {
    pub store: &'a dyn KnowledgeStore,
    pub settings: &'a Settings,
    pub embedder: &'a Embedder,
    pub sanitizer: &'a PiiSanitizer,
    pub scanner: &'a InjectionScanner,
    pub lsh_index: &'a MinHashLshIndex,
    pub gate: &'a RateGate,
    pub llm: Option<&'a LlmClient>,
    pub hub: &'a NotificationHub,
    pub webhooks: &'a WebhookDispatcher,
}

/// Raw tool arguments for a contribution
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub content: String,
    pub category: String,
    pub confidence: f32,
    pub framework: Option<String>,
    pub language: Option<String>,
    pub version: Option<String>,
    pub tags: Option<Vec<String>>,
    pub run_id: Option<String>,
}

/// Terminal contribution status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Queued,
    AutoApproved,
    DuplicateDetected,
}

impl IngestStatus {
    /// Wire representation used in tool responses
    pub fn as_str(self) -> &'static str {
        match self {
            IngestStatus::Queued => "queued",
            IngestStatus::AutoApproved => "auto_approved",
            IngestStatus::DuplicateDetected => "duplicate_detected",
        }
    }
}

/// Result of a completed add-knowledge flow
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub contribution_id: Uuid,
    pub status: IngestStatus,
    pub category: KnowledgeCategory,
    pub message: String,
    pub duplicate_of: Option<Uuid>,
}

/// Run the full add-knowledge flow for an authenticated caller
pub async fn add_knowledge(
    ctx: &IngestContext<'_>,
    auth: &AuthContext,
    request: IngestRequest,
) -> Result<IngestOutcome> {
    // Step 1: validate before touching anything stateful
    if request.content.len() < MIN_CONTENT_LENGTH {
        return Err(Error::Validation(
            "Rejected: content is too short (minimum 10 characters).".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&request.confidence) {
        return Err(Error::Validation(
            "Rejected: confidence must be between 0.0 and 1.0.".to_string(),
        ));
    }
    let category: KnowledgeCategory = request
        .category
        .parse()
        .map_err(|e: String| Error::Validation(format!("Rejected: {e}")))?;

    // Step 3: injection scan on the raw text, before any redaction can mask
    // the patterns
    let (is_injection, injection_score) = ctx.scanner.classify(&request.content);
    if is_injection {
        return Err(Error::ContentRejected(format!(
            "Rejected: content contains potential prompt injection \
             (confidence: {:.0}%). Malicious instructions are not allowed in the commons.",
            injection_score * 100.0
        )));
    }

    // Step 4: anti-sybil burst detection
    let contribution_probe = Uuid::new_v4().to_string();
    if ctx.gate.check_burst(&auth.tenant_id, &contribution_probe) {
        return Err(Error::QuotaExceeded(
            "Rate limit exceeded: too many contributions in a short window. \
             Please wait before submitting again."
                .to_string(),
        ));
    }

    // Step 5: PII strip; raw content stops existing past this point
    let (cleaned_content, should_reject) = ctx.sanitizer.strip(&request.content);
    if should_reject {
        return Err(Error::ContentRejected(
            "Rejected: too much content was identified as sensitive and redacted (>50%). \
             The contribution cannot be meaningfully preserved."
                .to_string(),
        ));
    }

    // Step 6: content hash of the cleaned text
    let content_hash = compute_content_hash(&cleaned_content);

    // Step 7: dedup, then conflict resolution for confirmed duplicates
    let dedup = run_dedup_pipeline(
        &cleaned_content,
        &auth.tenant_id,
        ctx.store,
        ctx.embedder,
        ctx.lsh_index,
        ctx.llm,
    )
    .await?;

    let mut fork_valid_at = None;
    let mut conflict_flagged = false;

    if dedup.action == DedupAction::Duplicate {
        let existing_id = dedup
            .duplicate_of
            .or_else(|| dedup.duplicates.first().map(|d| d.id))
            .ok_or_else(|| Error::InvalidState("duplicate verdict without candidate".to_string()))?;
        let existing_content = dedup
            .duplicates
            .iter()
            .find(|d| d.id == existing_id)
            .map(|d| d.content.as_str())
            .unwrap_or_default();

        let resolution =
            resolve_conflict(ctx.llm, &cleaned_content, existing_id, existing_content).await;

        match resolution.action {
            ConflictAction::Noop => {
                return Ok(IngestOutcome {
                    contribution_id: existing_id,
                    status: IngestStatus::DuplicateDetected,
                    category,
                    message: format!(
                        "Contribution not added: near-duplicate already exists in the commons. \
                         Reason: {}",
                        if resolution.reason.is_empty() {
                            "duplicate"
                        } else {
                            &resolution.reason
                        }
                    ),
                    duplicate_of: Some(existing_id),
                });
            }
            ConflictAction::Update | ConflictAction::VersionFork => {
                let applied =
                    apply_conflict_resolution(ctx.store, &resolution, &auth.tenant_id).await?;
                fork_valid_at = applied.valid_at;
            }
            ConflictAction::FlaggedForReview => {
                conflict_flagged = true;
            }
            ConflictAction::Add => {}
        }
    }

    // Tags travel as a JSON object so the flagging path can extend them
    let mut tag_list = request.tags.clone().unwrap_or_default();
    if conflict_flagged && !tag_list.iter().any(|t| t == "conflict_flagged") {
        tag_list.push("conflict_flagged".to_string());
    }
    let tags = if tag_list.is_empty() {
        None
    } else {
        Some(serde_json::json!({ "tags": tag_list }))
    };

    // Step 8: auto-approve rule match bypasses the pending queue entirely.
    // Conflict-flagged contributions always go to review.
    let auto_approve = !conflict_flagged
        && ctx
            .store
            .is_auto_approved(&auth.tenant_id, category)
            .await?;

    let now = Utc::now();

    if auto_approve {
        let item = KnowledgeItem {
            id: Uuid::new_v4(),
            tenant_id: auth.tenant_id.clone(),
            is_public: false,
            source_agent_id: auth.agent_id.clone(),
            run_id: request.run_id.clone(),
            content_hash,
            embedding: Some(ctx.embedder.embed(&cleaned_content)),
            category,
            confidence: request.confidence,
            framework: request.framework.clone(),
            language: request.language.clone(),
            version: request.version.clone(),
            tags,
            quality_score: initial_quality_score(request.confidence),
            retrieval_count: 0,
            helpful_count: 0,
            not_helpful_count: 0,
            contributed_at: now,
            approved_at: Some(now),
            expired_at: None,
            valid_at: fork_valid_at,
            invalid_at: None,
            deleted_at: None,
            content: cleaned_content.clone(),
        };
        ctx.store.insert_item(&item).await?;
        ctx.lsh_index.insert(item.id, &cleaned_content);

        publish_approved(ctx, &item).await;

        info!(
            "add_knowledge: auto-approved {} (tenant={}, category={category})",
            item.id, auth.tenant_id
        );
        return Ok(IngestOutcome {
            contribution_id: item.id,
            status: IngestStatus::AutoApproved,
            category,
            message: "Knowledge contribution auto-approved and added to the commons.".to_string(),
            duplicate_of: None,
        });
    }

    // Step 9: quarantine for operator review
    let contribution = PendingContribution {
        id: Uuid::new_v4(),
        tenant_id: auth.tenant_id.clone(),
        source_agent_id: auth.agent_id.clone(),
        run_id: request.run_id,
        content: cleaned_content,
        content_hash,
        category,
        confidence: request.confidence,
        framework: request.framework,
        language: request.language,
        version: request.version,
        tags,
        contributed_at: now,
        is_sensitive_flagged: false,
    };
    ctx.store.insert_pending(&contribution).await?;

    debug!(
        "add_knowledge: queued {} for review (tenant={})",
        contribution.id, auth.tenant_id
    );
    Ok(IngestOutcome {
        contribution_id: contribution.id,
        status: IngestStatus::Queued,
        category,
        message: "Knowledge contribution queued for review.".to_string(),
        duplicate_of: None,
    })
}

/// Promote a pending contribution into the knowledge commons
///
/// Generates the embedding, inserts the item, feeds the LSH index, and emits
/// the notification + webhook fan-out. The pending row is removed.
pub async fn promote_pending(ctx: &IngestContext<'_>, pending: &PendingContribution) -> Result<Uuid> {
    let now = Utc::now();
    let item = KnowledgeItem {
        id: Uuid::new_v4(),
        tenant_id: pending.tenant_id.clone(),
        is_public: false,
        source_agent_id: pending.source_agent_id.clone(),
        run_id: pending.run_id.clone(),
        content: pending.content.clone(),
        content_hash: pending.content_hash.clone(),
        category: pending.category,
        confidence: pending.confidence,
        framework: pending.framework.clone(),
        language: pending.language.clone(),
        version: pending.version.clone(),
        tags: pending.tags.clone(),
        embedding: Some(ctx.embedder.embed(&pending.content)),
        quality_score: initial_quality_score(pending.confidence),
        retrieval_count: 0,
        helpful_count: 0,
        not_helpful_count: 0,
        contributed_at: pending.contributed_at,
        approved_at: Some(now),
        expired_at: None,
        valid_at: None,
        invalid_at: None,
        deleted_at: None,
    };

    ctx.store.insert_item(&item).await?;
    ctx.store.delete_pending(pending.id).await?;
    ctx.lsh_index.insert(item.id, &item.content);

    publish_approved(ctx, &item).await;

    info!(
        "promote_pending: {} approved as {} (tenant={})",
        pending.id, item.id, item.tenant_id
    );
    Ok(item.id)
}

/// Emit the in-band notification and enqueue webhook deliveries
async fn publish_approved(ctx: &IngestContext<'_>, item: &KnowledgeItem) {
    ctx.hub.publish(KnowledgePublished {
        id: item.id,
        is_public: item.is_public,
        tenant_id: item.tenant_id.clone(),
        category: item.category,
        title: item.title(),
    });

    // Fan-out failure is logged by the dispatcher; it never fails an approval
    if let Err(e) = ctx
        .webhooks
        .dispatch(
            ctx.store,
            &item.tenant_id,
            EVENT_KNOWLEDGE_APPROVED,
            item.id,
            item.category.as_str(),
        )
        .await
    {
        tracing::warn!("webhook dispatch failed for {}: {e}", item.id);
    }
}
