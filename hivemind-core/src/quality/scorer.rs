//! Quality score computation from behavioral signals
//!
//! Pure function from denormalized and derived signals to a score in [0, 1]:
//!
//! ```text
//! usefulness    = helpful / max(helpful + not_helpful, 1)
//! popularity    = tanh(retrieval_count / 50)
//! freshness     = exp(-ln 2 * days_since_last_access / half_life)
//! version_bonus = 0.1 if is_version_current else 0.0
//! raw = 0.40*usefulness + 0.25*popularity + 0.20*freshness
//!       - 0.15*contradiction_rate + version_bonus
//! score = clamp(raw, 0, 1)
//! ```
//!
//! Weights and the half-life are configuration constants, not per-call inputs.

use crate::config::Settings;

/// Retrieval count at which popularity reaches tanh(1); saturates near 200
const POPULARITY_SCALE: f32 = 50.0;

/// Bonus for the current (non-superseded) version of a fact
const VERSION_BONUS: f32 = 0.1;

/// Component weights and freshness half-life
#[derive(Debug, Clone, Copy)]
pub struct QualityWeights {
    pub usefulness: f32,
    pub popularity: f32,
    pub freshness: f32,
    pub contradiction: f32,
    pub staleness_half_life_days: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            usefulness: 0.40,
            popularity: 0.25,
            freshness: 0.20,
            contradiction: 0.15,
            staleness_half_life_days: 90.0,
        }
    }
}

impl QualityWeights {
    /// Pull the configured weights out of settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            usefulness: settings.quality_weight_usefulness,
            popularity: settings.quality_weight_popularity,
            freshness: settings.quality_weight_freshness,
            contradiction: settings.quality_weight_contradiction,
            staleness_half_life_days: settings.quality_staleness_half_life_days,
        }
    }
}

/// Behavioral inputs for one item
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityInputs {
    pub retrieval_count: i64,
    pub helpful_count: i64,
    pub not_helpful_count: i64,
    /// Fraction of the item's signals that are contradiction flags, in [0, 1]
    pub contradiction_rate: f32,
    pub days_since_last_access: f32,
    pub is_version_current: bool,
}

/// Compute the quality score for a knowledge item
pub fn compute_quality_score(inputs: &QualityInputs, weights: &QualityWeights) -> f32 {
    let total_outcomes = inputs.helpful_count + inputs.not_helpful_count;
    let usefulness = inputs.helpful_count as f32 / total_outcomes.max(1) as f32;

    let popularity = (inputs.retrieval_count as f32 / POPULARITY_SCALE).tanh();

    // At t=0 freshness is 1.0; at t=half_life it is 0.5
    let half_life = weights.staleness_half_life_days.max(1e-9);
    let freshness =
        (-std::f32::consts::LN_2 * inputs.days_since_last_access / half_life).exp();

    let version_bonus = if inputs.is_version_current { VERSION_BONUS } else { 0.0 };

    let raw = weights.usefulness * usefulness
        + weights.popularity * popularity
        + weights.freshness * freshness
        - weights.contradiction * inputs.contradiction_rate
        + version_bonus;

    raw.clamp(0.0, 1.0)
}

/// Initial score at first ingest: a neutral-plus prior rewarding the agent's
/// self-reported confidence
pub fn initial_quality_score(confidence: f32) -> f32 {
    (confidence * 0.5).min(1.0)
}
