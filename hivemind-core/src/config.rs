//! Process-wide settings loaded from environment variables
//!
//! Every value has a development default so the server starts with no
//! environment at all. Read once at startup and shared behind an `Arc`.

use std::env;

/// Application settings loaded from environment variables
#[derive(Debug, Clone)]
pub struct Settings {
    /// libSQL database path or Turso URL
    pub database_url: String,
    /// HMAC signing secret for bearer tokens
    pub secret_key: String,
    /// Embedding model identity pin
    pub embedding_model: String,
    /// Embedding vector dimensionality
    pub embedding_dimensions: usize,
    /// Listen address for the HTTP server
    pub bind_addr: String,

    /// Anthropic API key; empty disables the LLM stages (permissive fallback)
    pub anthropic_api_key: String,
    /// LLM model identifier for dedup confirmation and conflict resolution
    pub llm_model: String,
    /// Hard timeout for LLM calls in seconds
    pub llm_timeout_secs: u64,

    /// Anti-sybil burst threshold (contributions per window)
    pub burst_threshold: usize,
    /// Anti-sybil sliding window in seconds
    pub burst_window_seconds: u64,

    /// Injection scanner positive threshold
    pub injection_threshold: f32,
    /// PII placeholder-ratio rejection threshold
    pub pii_rejection_threshold: f32,

    /// Default search page size
    pub default_search_limit: usize,
    /// Hard cap on search page size
    pub max_search_limit: usize,

    /// MinHash permutation count
    pub minhash_num_perm: usize,
    /// MinHash Jaccard threshold for near-duplicate hits
    pub minhash_threshold: f64,

    /// Quality score component weights
    pub quality_weight_usefulness: f32,
    pub quality_weight_popularity: f32,
    pub quality_weight_freshness: f32,
    pub quality_weight_contradiction: f32,
    /// Freshness half-life in days
    pub quality_staleness_half_life_days: f32,

    /// Distillation short-circuit: minimum pending volume
    pub distillation_volume_threshold: usize,
    /// Distillation short-circuit: minimum contradiction signals since last run
    pub distillation_conflict_threshold: usize,

    /// Seconds before an unreviewed claim on a pending row expires
    pub review_claim_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "hivemind.db".to_string(),
            secret_key: "dev-secret-change-me".to_string(),
            embedding_model: "hivemind/hash-embedder-v1".to_string(),
            embedding_dimensions: 384,
            bind_addr: "127.0.0.1:8420".to_string(),
            anthropic_api_key: String::new(),
            llm_model: "claude-3-haiku-20240307".to_string(),
            llm_timeout_secs: 10,
            burst_threshold: 50,
            burst_window_seconds: 60,
            injection_threshold: 0.5,
            pii_rejection_threshold: 0.50,
            default_search_limit: 10,
            max_search_limit: 50,
            minhash_num_perm: 128,
            minhash_threshold: 0.95,
            quality_weight_usefulness: 0.40,
            quality_weight_popularity: 0.25,
            quality_weight_freshness: 0.20,
            quality_weight_contradiction: 0.15,
            quality_staleness_half_life_days: 90.0,
            distillation_volume_threshold: 10,
            distillation_conflict_threshold: 5,
            review_claim_ttl_secs: 300,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            database_url: env_string("DATABASE_URL", &d.database_url),
            secret_key: env_string("SECRET_KEY", &d.secret_key),
            embedding_model: env_string("EMBEDDING_MODEL", &d.embedding_model),
            embedding_dimensions: env_or("EMBEDDING_DIMENSIONS", d.embedding_dimensions),
            bind_addr: env_string("BIND_ADDR", &d.bind_addr),
            anthropic_api_key: env_string("ANTHROPIC_API_KEY", ""),
            llm_model: env_string("LLM_MODEL", &d.llm_model),
            llm_timeout_secs: env_or("LLM_TIMEOUT_SECS", d.llm_timeout_secs),
            burst_threshold: env_or("BURST_THRESHOLD", d.burst_threshold),
            burst_window_seconds: env_or("BURST_WINDOW_SECONDS", d.burst_window_seconds),
            injection_threshold: env_or("INJECTION_THRESHOLD", d.injection_threshold),
            pii_rejection_threshold: env_or("PII_REJECTION_THRESHOLD", d.pii_rejection_threshold),
            default_search_limit: env_or("DEFAULT_SEARCH_LIMIT", d.default_search_limit),
            max_search_limit: env_or("MAX_SEARCH_LIMIT", d.max_search_limit),
            minhash_num_perm: env_or("MINHASH_NUM_PERM", d.minhash_num_perm),
            minhash_threshold: env_or("MINHASH_THRESHOLD", d.minhash_threshold),
            quality_weight_usefulness: env_or(
                "QUALITY_WEIGHT_USEFULNESS",
                d.quality_weight_usefulness,
            ),
            quality_weight_popularity: env_or(
                "QUALITY_WEIGHT_POPULARITY",
                d.quality_weight_popularity,
            ),
            quality_weight_freshness: env_or("QUALITY_WEIGHT_FRESHNESS", d.quality_weight_freshness),
            quality_weight_contradiction: env_or(
                "QUALITY_WEIGHT_CONTRADICTION",
                d.quality_weight_contradiction,
            ),
            quality_staleness_half_life_days: env_or(
                "QUALITY_STALENESS_HALF_LIFE_DAYS",
                d.quality_staleness_half_life_days,
            ),
            distillation_volume_threshold: env_or(
                "DISTILLATION_VOLUME_THRESHOLD",
                d.distillation_volume_threshold,
            ),
            distillation_conflict_threshold: env_or(
                "DISTILLATION_CONFLICT_THRESHOLD",
                d.distillation_conflict_threshold,
            ),
            review_claim_ttl_secs: env_or("REVIEW_CLAIM_TTL_SECS", d.review_claim_ttl_secs),
        }
    }

    /// True when an LLM vendor key is configured
    pub fn llm_enabled(&self) -> bool {
        !self.anthropic_api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let s = Settings::default();
        assert_eq!(s.burst_threshold, 50);
        assert_eq!(s.burst_window_seconds, 60);
        assert_eq!(s.minhash_num_perm, 128);
        assert!((s.minhash_threshold - 0.95).abs() < f64::EPSILON);
        assert!((s.injection_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(s.embedding_dimensions, 384);
        assert_eq!(s.max_search_limit, 50);
    }

    #[test]
    fn llm_disabled_without_key() {
        let s = Settings::default();
        assert!(!s.llm_enabled());
    }
}
