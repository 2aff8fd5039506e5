//! Sleep-time distillation
//!
//! Periodic curation pass keeping the commons self-healing:
//!   1. Threshold check    — short-circuit when pending volume and new
//!                           contradiction count are both below thresholds
//!   2. Duplicate merging  — expire non-canonical duplicates, keep the
//!                           highest-quality item, link provenance
//!   3. Contradiction flag — cluster contradicting items for human review
//!   4. Summary generation — LLM summary for clusters of 3+ related items,
//!                           with a mandatory PII re-scan on every summary
//!   5. Quality pre-screen — flag low-quality pending contributions
//!
//! Runs only from the background scheduler, never from the request path.
//! Merged duplicates are expired, never deleted — the audit trail stays
//! intact, and provenance links in the canonical item's tags let derived
//! summaries be re-evaluated if a source is later removed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::embeddings::{cosine_distance, Embedder};
use crate::integrity::compute_content_hash;
use crate::llm::LlmClient;
use crate::pipeline::PiiSanitizer;
use crate::quality::scorer::{compute_quality_score, QualityInputs, QualityWeights};
use crate::storage::{ClusterableItem, KnowledgeStore};
use crate::types::{KnowledgeCategory, KnowledgeItem, QualitySignal, SignalType};
use crate::Result;

/// Deployment-config key holding the last run timestamp
pub const LAST_RUN_KEY: &str = "distillation_last_run";

/// Cosine distance below which two items belong to the same cluster
const CLUSTER_DISTANCE_THRESHOLD: f32 = 0.3;

/// Minimum cluster size that triggers summary generation
const MIN_CLUSTER_SIZE: usize = 3;

/// Preliminary-score floor for the pending pre-screen
const LOW_QUALITY_THRESHOLD: f32 = 0.2;

const SUMMARY_PROMPT: &str = "Summarize these related knowledge items into a single concise item \
that captures the key information. Preserve technical accuracy. Output only the summary text.";

/// Outcome summary of one distillation run
#[derive(Debug, Clone, Serialize)]
pub struct DistillationReport {
    pub status: &'static str,
    pub duplicates_merged: usize,
    pub contradictions_flagged: usize,
    pub summaries_generated: usize,
    pub items_prescreened: usize,
    pub low_quality_filtered: usize,
    pub run_at: DateTime<Utc>,
}

impl DistillationReport {
    fn skipped(run_at: DateTime<Utc>) -> Self {
        Self {
            status: "skipped",
            duplicates_merged: 0,
            contradictions_flagged: 0,
            summaries_generated: 0,
            items_prescreened: 0,
            low_quality_filtered: 0,
            run_at,
        }
    }
}

/// Run the full distillation pipeline
pub async fn run_distillation(
    store: &dyn KnowledgeStore,
    settings: &Settings,
    sanitizer: &PiiSanitizer,
    embedder: &Embedder,
    llm: Option<&LlmClient>,
) -> Result<DistillationReport> {
    let now = Utc::now();

    // ------------------------------------------------------------------
    // 1. Threshold check: the scheduler only knows about time; the decision
    //    whether there is enough work lives here
    // ------------------------------------------------------------------
    let pending_count = store.count_pending().await? as usize;
    let last_run = read_last_run(store).await?;
    let conflict_count = store.contradiction_signals_since(last_run).await? as usize;

    if pending_count < settings.distillation_volume_threshold
        && conflict_count < settings.distillation_conflict_threshold
    {
        info!(
            "distillation: skipped - pending={pending_count} (threshold={}), conflicts={conflict_count} (threshold={})",
            settings.distillation_volume_threshold, settings.distillation_conflict_threshold
        );
        return Ok(DistillationReport::skipped(now));
    }

    info!("distillation: starting - pending={pending_count}, conflicts={conflict_count}");

    let duplicates_merged = merge_duplicates(store, now).await?;
    let contradictions_flagged = flag_contradictions(store, now).await?;
    let summaries_generated = summarize_clusters(store, sanitizer, embedder, llm, now).await?;
    let (items_prescreened, low_quality_filtered) =
        prescreen_pending(store, settings).await?;

    store.upsert_config(LAST_RUN_KEY, &now.to_rfc3339()).await?;

    let report = DistillationReport {
        status: "completed",
        duplicates_merged,
        contradictions_flagged,
        summaries_generated,
        items_prescreened,
        low_quality_filtered,
        run_at: now,
    };
    info!("distillation: completed - {:?}", report);
    Ok(report)
}

async fn read_last_run(store: &dyn KnowledgeStore) -> Result<DateTime<Utc>> {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    Ok(store
        .get_config(LAST_RUN_KEY)
        .await?
        .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
        .unwrap_or(epoch))
}

/// Step 2: expire non-canonical duplicates within (content_hash, tenant)
async fn merge_duplicates(store: &dyn KnowledgeStore, now: DateTime<Utc>) -> Result<usize> {
    let mut merged = 0;

    for group in store.duplicate_groups().await? {
        if group.ids.len() < 2 {
            continue;
        }
        // Members arrive ordered by quality_score descending
        let canonical_id = group.ids[0];
        let non_canonical = &group.ids[1..];

        let Some(canonical) = store.get_item_any(canonical_id).await? else {
            continue;
        };

        let mut tags = canonical
            .tags
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        let links = tags
            .as_object_mut()
            .map(|obj| {
                obj.entry("provenance_links")
                    .or_insert_with(|| serde_json::json!([]))
            });
        if let Some(serde_json::Value::Array(arr)) = links {
            arr.extend(non_canonical.iter().map(|id| serde_json::json!(id.to_string())));
        }
        store.update_item_tags(canonical_id, &tags).await?;

        for &id in non_canonical {
            store.supersede_item(id, &group.tenant_id, now).await?;
        }
        merged += non_canonical.len();
    }

    info!("distillation: duplicate merging complete - {merged} merged");
    Ok(merged)
}

/// Step 3: group contradiction-flagged items by (category, tenant) and anchor
/// a cluster signal on the first member
async fn flag_contradictions(store: &dyn KnowledgeStore, now: DateTime<Utc>) -> Result<usize> {
    let flagged = store.contradiction_flagged_items().await?;

    let mut clusters: HashMap<(KnowledgeCategory, String), Vec<Uuid>> = HashMap::new();
    for (id, category, tenant_id) in flagged {
        clusters.entry((category, tenant_id)).or_default().push(id);
    }

    let mut count = 0;
    for ((category, tenant_id), item_ids) in clusters {
        if item_ids.len() < 2 {
            continue;
        }

        let signal = QualitySignal {
            id: Uuid::new_v4(),
            knowledge_item_id: item_ids[0],
            signal_type: SignalType::ContradictionCluster,
            agent_id: None,
            run_id: None,
            metadata: Some(serde_json::json!({
                "conflicting_item_ids": item_ids.iter().map(Uuid::to_string).collect::<Vec<_>>(),
                "category": category.as_str(),
                "tenant_id": tenant_id,
                "detected_at": now.to_rfc3339(),
            })),
            created_at: now,
        };
        store.record_signal(&signal).await?;
        count += 1;
    }

    info!("distillation: contradiction flagging complete - {count} clusters");
    Ok(count)
}

/// Step 4: cluster related items by embedding distance and summarize
async fn summarize_clusters(
    store: &dyn KnowledgeStore,
    sanitizer: &PiiSanitizer,
    embedder: &Embedder,
    llm: Option<&LlmClient>,
    now: DateTime<Utc>,
) -> Result<usize> {
    let Some(llm) = llm else {
        debug!("distillation: no API key - skipping summary generation");
        return Ok(0);
    };

    let items = store.clusterable_items().await?;
    let clusters = connected_components(&items);

    let mut generated = 0;
    for cluster in clusters {
        if cluster.len() < MIN_CLUSTER_SIZE {
            continue;
        }
        let category = cluster[0].category;
        let tenant_id = cluster[0].tenant_id.clone();

        let joined = cluster
            .iter()
            .enumerate()
            .map(|(i, item)| format!("Item {}:\n{}", i + 1, item.content))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        let prompt = format!("{SUMMARY_PROMPT}\n\n{joined}");

        let summary = match llm.complete(&prompt, 512).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("distillation: LLM summary call failed - {e} (skipping)");
                continue;
            }
        };
        if summary.is_empty() {
            continue;
        }

        // Generated text re-enters the commons, so it goes through the same
        // sanitizer as agent contributions - no exceptions
        let (cleaned, should_reject) = sanitizer.strip(&summary);
        if should_reject {
            warn!(
                "distillation: generated summary rejected (>50% redacted) for cluster \
                 (category={category}, tenant={tenant_id}) - skipping"
            );
            continue;
        }

        let source_ids: Vec<String> = cluster.iter().map(|i| i.id.to_string()).collect();
        let item = KnowledgeItem {
            id: Uuid::new_v4(),
            tenant_id,
            is_public: false,
            source_agent_id: "distillation".to_string(),
            run_id: None,
            content_hash: compute_content_hash(&cleaned),
            embedding: Some(embedder.embed(&cleaned)),
            content: cleaned,
            category,
            confidence: 0.8,
            framework: None,
            language: None,
            version: None,
            tags: Some(serde_json::json!({
                "distilled": true,
                "source_item_ids": source_ids,
            })),
            quality_score: 0.6,
            retrieval_count: 0,
            helpful_count: 0,
            not_helpful_count: 0,
            contributed_at: now,
            approved_at: Some(now),
            expired_at: None,
            valid_at: None,
            invalid_at: None,
            deleted_at: None,
        };
        // A summary regenerated for an unchanged cluster collides with the
        // content-hash uniqueness of its earlier copy; skip, don't abort
        if let Err(e) = store.insert_item(&item).await {
            warn!("distillation: failed to store summary - {e} (skipping)");
            continue;
        }
        generated += 1;
    }

    info!("distillation: summary generation complete - {generated} summaries");
    Ok(generated)
}

/// Connected components over pairs with cosine distance below the cluster
/// threshold, restricted to the same (category, tenant)
fn connected_components(items: &[ClusterableItem]) -> Vec<Vec<ClusterableItem>> {
    let n = items.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            if items[i].category != items[j].category || items[i].tenant_id != items[j].tenant_id
            {
                continue;
            }
            if cosine_distance(&items[i].embedding, &items[j].embedding)
                < CLUSTER_DISTANCE_THRESHOLD
            {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    let mut visited = vec![false; n];
    let mut components = Vec::new();
    for start in 0..n {
        if visited[start] || adjacency[start].is_empty() {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = vec![start];
        while let Some(node) = queue.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(items[node].clone());
            queue.extend(adjacency[node].iter().copied().filter(|&next| !visited[next]));
        }
        components.push(component);
    }
    components
}

/// Step 5: flag low-quality pending contributions before they reach review
async fn prescreen_pending(
    store: &dyn KnowledgeStore,
    settings: &Settings,
) -> Result<(usize, usize)> {
    let weights = QualityWeights::from_settings(settings);
    let mut prescreened = 0;
    let mut filtered = 0;

    for item in store.unflagged_pending().await? {
        prescreened += 1;

        // Pending items have no behavioral history; confidence inversion
        // stands in for the contradiction rate
        let inputs = QualityInputs {
            contradiction_rate: (1.0 - item.confidence).max(0.0),
            is_version_current: true,
            ..QualityInputs::default()
        };
        let preliminary = compute_quality_score(&inputs, &weights);

        if preliminary < LOW_QUALITY_THRESHOLD {
            let mut tags = item.tags.clone().unwrap_or_else(|| serde_json::json!({}));
            if let Some(obj) = tags.as_object_mut() {
                obj.insert("low_quality_prescreened".to_string(), serde_json::json!(true));
                obj.insert(
                    "preliminary_quality_score".to_string(),
                    serde_json::json!(preliminary),
                );
            }
            store.flag_pending_sensitive(item.id, &tags).await?;
            filtered += 1;
        }
    }

    info!(
        "distillation: pre-screening complete - {prescreened} prescreened, {filtered} low-quality flagged"
    );
    Ok((prescreened, filtered))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusterable(category: KnowledgeCategory, tenant: &str, embedding: Vec<f32>) -> ClusterableItem {
        ClusterableItem {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            category,
            content: "content".to_string(),
            embedding,
        }
    }

    #[test]
    fn close_items_cluster_together() {
        let a = clusterable(KnowledgeCategory::Tooling, "acme", vec![1.0, 0.0, 0.0]);
        let b = clusterable(KnowledgeCategory::Tooling, "acme", vec![0.99, 0.05, 0.0]);
        let c = clusterable(KnowledgeCategory::Tooling, "acme", vec![0.98, 0.08, 0.0]);
        let far = clusterable(KnowledgeCategory::Tooling, "acme", vec![0.0, 0.0, 1.0]);

        let components = connected_components(&[a, b, c, far]);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].len(), 3);
    }

    #[test]
    fn tenants_never_cluster_across() {
        let a = clusterable(KnowledgeCategory::Config, "acme", vec![1.0, 0.0]);
        let b = clusterable(KnowledgeCategory::Config, "globex", vec![1.0, 0.0]);
        let components = connected_components(&[a, b]);
        assert!(components.is_empty());
    }

    #[test]
    fn categories_never_cluster_across() {
        let a = clusterable(KnowledgeCategory::Config, "acme", vec![1.0, 0.0]);
        let b = clusterable(KnowledgeCategory::Tooling, "acme", vec![1.0, 0.0]);
        let components = connected_components(&[a, b]);
        assert!(components.is_empty());
    }

    #[test]
    fn low_confidence_pending_would_be_flagged() {
        // contradiction_rate = 1 - 0.1 = 0.9 drags the preliminary score
        // under the 0.2 floor
        let inputs = QualityInputs {
            contradiction_rate: 0.9,
            is_version_current: true,
            ..QualityInputs::default()
        };
        let score = compute_quality_score(&inputs, &QualityWeights::default());
        assert!(score < LOW_QUALITY_THRESHOLD);
    }

    #[test]
    fn high_confidence_pending_passes_prescreen() {
        let inputs = QualityInputs {
            contradiction_rate: 0.2,
            is_version_current: true,
            ..QualityInputs::default()
        };
        let score = compute_quality_score(&inputs, &QualityWeights::default());
        assert!(score >= LOW_QUALITY_THRESHOLD);
    }
}
