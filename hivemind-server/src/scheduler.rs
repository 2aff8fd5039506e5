//! Background job scheduler
//!
//! Two interval-driven workers: quality signal aggregation every 10 minutes
//! and distillation every 30 minutes. The scheduler only knows about time;
//! whether there is enough work (pending volume, contradiction counts) is
//! decided inside the distillation task itself.

use std::sync::Arc;
use std::time::Duration;

use hivemind_core::quality::{aggregate_quality_signals, run_distillation, QualityWeights};
use tracing::{error, info};

use crate::state::AppState;

/// Aggregator cadence
const AGGREGATION_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Distillation cadence
const DISTILLATION_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Spawn both background workers
pub fn spawn_background_jobs(state: Arc<AppState>) {
    let aggregation_state = Arc::clone(&state);
    tokio::spawn(async move {
        let weights = QualityWeights::from_settings(&aggregation_state.settings);
        let mut ticker = tokio::time::interval(AGGREGATION_INTERVAL);
        // The immediate first tick is skipped; startup is busy enough
        ticker.tick().await;
        loop {
            ticker.tick().await;
            // Piggyback rate-gate housekeeping on the aggregation cadence
            aggregation_state.gate.cleanup();
            match aggregate_quality_signals(aggregation_state.store.as_ref(), &weights).await {
                Ok(report) => {
                    info!("aggregation run: {} items updated", report.items_updated);
                }
                Err(e) => error!("aggregation run failed: {e}"),
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DISTILLATION_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match run_distillation(
                state.store.as_ref(),
                &state.settings,
                &state.sanitizer,
                &state.embedder,
                state.llm.as_ref(),
            )
            .await
            {
                Ok(report) => info!(
                    "distillation run: status={} merged={} flagged={} summaries={}",
                    report.status,
                    report.duplicates_merged,
                    report.contradictions_flagged,
                    report.summaries_generated,
                ),
                Err(e) => error!("distillation run failed: {e}"),
            }
        }
    });

    info!("background jobs scheduled: aggregation every 10m, distillation every 30m");
}
