//! Three-stage near-duplicate detection pipeline
//!
//! Each stage is a filter; an empty survivor set at any stage short-circuits
//! to `ADD` without running the remaining stages:
//!
//!   Stage 1 (vector)  — top-10 items by embedding cosine distance, keeping
//!                       only those within distance 0.35.
//!   Stage 2 (MinHash)  — intersect Stage-1 survivors with the LSH index hits
//!                       (Jaccard >= 0.95).
//!   Stage 3 (LLM)      — semantic yes/no confirmation for up to 3 survivors;
//!                       skipped entirely when no LLM is configured.
//!
//! The pipeline never blocks a contribution on its own failure: any internal
//! error degrades to `ADD`.

pub mod minhash;

pub use minhash::MinHashLshIndex;

use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::llm::{parse_json_reply, LlmClient};
use crate::storage::{KnowledgeStore, SimilarItem};
use crate::Result;

/// Stage-1 candidate cap
const VECTOR_TOP_K: usize = 10;

/// Stage-1 cosine distance ceiling (< 0.35 distance = >= 65% similarity)
const MAX_COSINE_DISTANCE: f32 = 0.35;

/// Stage-3 candidate cap, bounding LLM spend per contribution
const MAX_LLM_CANDIDATES: usize = 3;

const DEDUP_PROMPT: &str = "You are a deduplication assistant. Compare these two knowledge items and \
determine if they are semantically duplicate (same information, possibly different wording). \
Respond with JSON only - no explanation outside the JSON:\n\n\
{\"is_duplicate\": bool, \"confidence\": float, \"reason\": string}\n\n";

/// Final pipeline verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupAction {
    Add,
    Duplicate,
}

/// Pipeline outcome with the evidence gathered along the way
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub action: DedupAction,
    pub duplicate_of: Option<Uuid>,
    pub confidence: Option<f32>,
    pub reason: Option<String>,
    /// Candidates surviving the deepest stage that ran
    pub duplicates: Vec<SimilarItem>,
    /// Names of the stages that executed, in order
    pub stages_run: Vec<&'static str>,
}

impl DedupOutcome {
    fn add(duplicates: Vec<SimilarItem>, stages_run: Vec<&'static str>) -> Self {
        Self {
            action: DedupAction::Add,
            duplicate_of: None,
            confidence: None,
            reason: None,
            duplicates,
            stages_run,
        }
    }
}

/// Strict-JSON verdict expected from the Stage-3 LLM
#[derive(Debug, Deserialize)]
struct LlmVerdict {
    #[serde(default)]
    is_duplicate: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reason: String,
}

/// Run the three-stage dedup pipeline for a candidate contribution
///
/// `content` must already be sanitized. The tenant scopes Stage-1 candidate
/// retrieval to the caller's namespace plus the public commons.
pub async fn run_dedup_pipeline(
    content: &str,
    tenant_id: &str,
    store: &dyn KnowledgeStore,
    embedder: &Embedder,
    lsh_index: &MinHashLshIndex,
    llm: Option<&LlmClient>,
) -> Result<DedupOutcome> {
    let mut stages_run: Vec<&'static str> = Vec::with_capacity(3);

    // Stage 1: cosine candidate retrieval
    stages_run.push("cosine");
    let embedding = embedder.embed(content);
    let candidates: Vec<SimilarItem> = store
        .find_similar_items(&embedding, tenant_id, VECTOR_TOP_K)
        .await?
        .into_iter()
        .filter(|c| c.distance < MAX_COSINE_DISTANCE)
        .collect();

    if candidates.is_empty() {
        debug!("dedup: no cosine candidates - ADD");
        return Ok(DedupOutcome::add(Vec::new(), stages_run));
    }

    // Stage 2: MinHash-LSH intersection. Similar by embedding but not by
    // Jaccard means different content.
    stages_run.push("minhash");
    let minhash_ids: std::collections::HashSet<Uuid> =
        lsh_index.query(content).into_iter().collect();

    let survivors: Vec<SimilarItem> = candidates
        .iter()
        .filter(|c| minhash_ids.contains(&c.id))
        .cloned()
        .collect();

    if survivors.is_empty() {
        debug!(
            "dedup: {} cosine candidates but no MinHash overlap - ADD",
            candidates.len()
        );
        return Ok(DedupOutcome::add(candidates, stages_run));
    }

    // Stage 3: LLM semantic confirmation (skipped without a configured client)
    stages_run.push("llm");
    let Some(llm) = llm else {
        debug!("dedup: LLM stage skipped - no API key configured - ADD");
        return Ok(DedupOutcome::add(survivors, stages_run));
    };

    let mut best: Option<(Uuid, f32, String)> = None;
    for candidate in survivors.iter().take(MAX_LLM_CANDIDATES) {
        let verdict = confirm_duplicate(llm, content, &candidate.content).await;
        if verdict.is_duplicate
            && best.as_ref().is_none_or(|(_, conf, _)| verdict.confidence > *conf)
        {
            best = Some((candidate.id, verdict.confidence, verdict.reason));
        }
    }

    if let Some((duplicate_of, confidence, reason)) = best {
        info!(
            "dedup: DUPLICATE confirmed (id={duplicate_of}, confidence={confidence:.2})"
        );
        return Ok(DedupOutcome {
            action: DedupAction::Duplicate,
            duplicate_of: Some(duplicate_of),
            confidence: Some(confidence),
            reason: Some(reason),
            duplicates: survivors,
            stages_run,
        });
    }

    debug!(
        "dedup: {} intersection candidates, LLM did not confirm duplicate - ADD",
        survivors.len()
    );
    Ok(DedupOutcome::add(survivors, stages_run))
}

/// Ask the LLM whether two items are semantic duplicates
///
/// Any failure (timeout, API error, malformed reply) yields a negative
/// verdict so the pipeline falls through to ADD.
async fn confirm_duplicate(llm: &LlmClient, content_a: &str, content_b: &str) -> LlmVerdict {
    let prompt = format!("{DEDUP_PROMPT}ITEM A:\n{content_a}\n\nITEM B:\n{content_b}");

    match llm.complete(&prompt, 256).await {
        Ok(raw) => parse_json_reply::<LlmVerdict>(&raw).unwrap_or_else(|| LlmVerdict {
            is_duplicate: false,
            confidence: 0.0,
            reason: "response parse failed".to_string(),
        }),
        Err(e) => {
            warn!("dedup: LLM stage skipped - {e}");
            LlmVerdict {
                is_duplicate: false,
                confidence: 0.0,
                reason: format!("LLM stage skipped - {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_defaults_are_negative() {
        let v: LlmVerdict = parse_json_reply("{}").unwrap();
        assert!(!v.is_duplicate);
        assert!((v.confidence - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn outcome_add_carries_evidence() {
        let outcome = DedupOutcome::add(Vec::new(), vec!["cosine"]);
        assert_eq!(outcome.action, DedupAction::Add);
        assert!(outcome.duplicate_of.is_none());
        assert_eq!(outcome.stages_run, vec!["cosine"]);
    }
}
