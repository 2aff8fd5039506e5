//! Periodic quality signal aggregation
//!
//! Recomputes `quality_score` for every item that received new signals since
//! the last run. The watermark lives in `deployment_config` under
//! `quality_aggregation_last_run`, so cost scales with signal volume rather
//! than table size. Designed to run from the background scheduler every
//! 10 minutes; safe to run concurrently with request traffic.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::quality::scorer::{compute_quality_score, QualityInputs, QualityWeights};
use crate::storage::KnowledgeStore;
use crate::Result;

/// Deployment-config key holding the last successful run timestamp
pub const LAST_RUN_KEY: &str = "quality_aggregation_last_run";

/// Outcome summary of one aggregation run
#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub items_updated: usize,
    pub run_at: DateTime<Utc>,
}

/// Read the watermark, treating a missing or corrupt value as the epoch
async fn read_last_run(store: &dyn KnowledgeStore) -> Result<DateTime<Utc>> {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    match store.get_config(LAST_RUN_KEY).await? {
        None => {
            info!("{LAST_RUN_KEY} not set - first run, processing all items");
            Ok(epoch)
        }
        Some(raw) => match raw.parse::<DateTime<Utc>>() {
            Ok(ts) => Ok(ts),
            Err(_) => {
                warn!("{LAST_RUN_KEY} has invalid value '{raw}' - resetting to epoch");
                Ok(epoch)
            }
        },
    }
}

/// Aggregate behavioral signals and recompute quality scores
pub async fn aggregate_quality_signals(
    store: &dyn KnowledgeStore,
    weights: &QualityWeights,
) -> Result<AggregationReport> {
    let run_at = Utc::now();
    let last_run = read_last_run(store).await?;

    let affected = store.items_with_signals_since(last_run).await?;
    info!(
        "quality signal aggregation: {} items to recompute (since {last_run})",
        affected.len()
    );

    let mut items_updated = 0;
    for item_id in affected {
        let Some(item) = store.get_item_any(item_id).await? else {
            warn!("aggregator: item {item_id} in signals but not in knowledge items - skipping");
            continue;
        };

        let counts = store.signal_counts(item_id).await?;
        let contradiction_rate = if counts.total > 0 {
            counts.contradictions as f32 / counts.total as f32
        } else {
            0.0
        };

        // Last access is the latest retrieval signal; items never retrieved
        // fall back to their approval time
        let last_access = match store.last_retrieval_at(item_id).await? {
            Some(ts) => Some(ts),
            None => item.approved_at,
        };
        let days_since_last_access = last_access
            .map(|ts| ((run_at - ts).num_seconds().max(0) as f32) / 86_400.0)
            .unwrap_or(0.0);

        let inputs = QualityInputs {
            retrieval_count: item.retrieval_count,
            helpful_count: item.helpful_count,
            not_helpful_count: item.not_helpful_count,
            contradiction_rate,
            days_since_last_access,
            is_version_current: item.expired_at.is_none(),
        };

        let new_score = compute_quality_score(&inputs, weights);
        store.update_quality_score(item_id, new_score).await?;
        items_updated += 1;

        debug!(
            "updated quality_score for item {item_id}: {new_score:.4} \
             (retrieval={}, helpful={}, not_helpful={}, contradiction_rate={contradiction_rate:.3}, \
             days_since_access={days_since_last_access:.1})",
            item.retrieval_count, item.helpful_count, item.not_helpful_count,
        );
    }

    store
        .upsert_config(LAST_RUN_KEY, &run_at.to_rfc3339())
        .await?;

    info!("quality signal aggregation complete: {items_updated} items updated at {run_at}");
    Ok(AggregationReport {
        items_updated,
        run_at,
    })
}
