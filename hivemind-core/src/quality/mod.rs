//! Quality intelligence loop
//!
//! Behavioral signals (retrievals, outcome reports, contradiction flags) feed
//! a deterministic scoring formula. The loop closes asynchronously:
//!
//!   outcome reports -> quality_signals log
//!   -> [`aggregator`] (every 10 minutes) -> updated quality_score
//!   -> quality-boosted ranking in hybrid search
//!
//! [`distillation`] runs every 30 minutes and curates the commons: merges
//! duplicates, flags contradiction clusters, summarizes dense clusters, and
//! pre-screens the pending queue.

pub mod aggregator;
pub mod distillation;
pub mod scorer;

pub use aggregator::aggregate_quality_signals;
pub use distillation::run_distillation;
pub use scorer::{compute_quality_score, initial_quality_score, QualityInputs, QualityWeights};
