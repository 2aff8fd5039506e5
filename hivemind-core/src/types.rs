//! Common types shared across the knowledge lifecycle engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed vocabulary of knowledge categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    BugFix,
    Config,
    DomainExpertise,
    Workaround,
    PricingData,
    RegulatoryRule,
    Tooling,
    ReasoningTrace,
    FailedApproach,
    VersionWorkaround,
    General,
}

impl KnowledgeCategory {
    /// All valid category values, in declaration order
    pub const ALL: [KnowledgeCategory; 11] = [
        KnowledgeCategory::BugFix,
        KnowledgeCategory::Config,
        KnowledgeCategory::DomainExpertise,
        KnowledgeCategory::Workaround,
        KnowledgeCategory::PricingData,
        KnowledgeCategory::RegulatoryRule,
        KnowledgeCategory::Tooling,
        KnowledgeCategory::ReasoningTrace,
        KnowledgeCategory::FailedApproach,
        KnowledgeCategory::VersionWorkaround,
        KnowledgeCategory::General,
    ];

    /// Stable storage representation
    pub fn as_str(self) -> &'static str {
        match self {
            KnowledgeCategory::BugFix => "bug_fix",
            KnowledgeCategory::Config => "config",
            KnowledgeCategory::DomainExpertise => "domain_expertise",
            KnowledgeCategory::Workaround => "workaround",
            KnowledgeCategory::PricingData => "pricing_data",
            KnowledgeCategory::RegulatoryRule => "regulatory_rule",
            KnowledgeCategory::Tooling => "tooling",
            KnowledgeCategory::ReasoningTrace => "reasoning_trace",
            KnowledgeCategory::FailedApproach => "failed_approach",
            KnowledgeCategory::VersionWorkaround => "version_workaround",
            KnowledgeCategory::General => "general",
        }
    }

    /// Comma-separated list of valid values for error messages
    pub fn valid_values() -> String {
        Self::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for KnowledgeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KnowledgeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("'{s}' is not a valid category. Valid values: {}", Self::valid_values()))
    }
}

/// Behavioral signal vocabulary for the quality loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Retrieval,
    OutcomeSolved,
    OutcomeNotHelpful,
    Contradiction,
    ContradictionCluster,
}

impl SignalType {
    /// Stable storage representation
    pub fn as_str(self) -> &'static str {
        match self {
            SignalType::Retrieval => "retrieval",
            SignalType::OutcomeSolved => "outcome_solved",
            SignalType::OutcomeNotHelpful => "outcome_not_helpful",
            SignalType::Contradiction => "contradiction",
            SignalType::ContradictionCluster => "contradiction_cluster",
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API key billing tier controlling per-minute operation quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    /// Stable storage representation
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Per-minute contribution quota for this tier
    pub fn contributions_per_minute(self) -> usize {
        match self {
            Tier::Free => 10,
            Tier::Pro => 60,
            Tier::Enterprise => 300,
        }
    }

    /// Per-minute search quota for this tier
    pub fn searches_per_minute(self) -> usize {
        match self {
            Tier::Free => 30,
            Tier::Pro => 200,
            Tier::Enterprise => 1000,
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!("'{other}' is not a valid tier")),
        }
    }
}

/// Caller identity extracted from a verified credential
///
/// Tenant and agent are NEVER accepted from tool arguments; they come from
/// the bearer token or API key record exclusively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub tenant_id: String,
    pub agent_id: String,
}

/// The authoritative, searchable knowledge unit
///
/// Carries two time axes: system time (`contributed_at`/`expired_at` — when
/// the system knew the fact) and world time (`valid_at`/`invalid_at` — when
/// the fact held in reality). `expired_at IS NULL` marks the current version;
/// `deleted_at` soft-deletes without dropping the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: Uuid,
    pub tenant_id: String,
    pub is_public: bool,
    pub source_agent_id: String,
    pub run_id: Option<String>,
    /// Post-sanitization content; raw contributed text is never stored
    pub content: String,
    /// Hex SHA-256 of `content`
    pub content_hash: String,
    pub category: KnowledgeCategory,
    pub confidence: f32,
    pub framework: Option<String>,
    pub language: Option<String>,
    pub version: Option<String>,
    pub tags: Option<serde_json::Value>,
    pub embedding: Option<Vec<f32>>,
    pub quality_score: f32,
    pub retrieval_count: i64,
    pub helpful_count: i64,
    pub not_helpful_count: i64,
    pub contributed_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub valid_at: Option<DateTime<Utc>>,
    pub invalid_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl KnowledgeItem {
    /// First 80 characters of content, with ellipsis when truncated
    ///
    /// Used as the display title in summary-tier search results.
    pub fn title(&self) -> String {
        let truncated: String = self.content.chars().take(80).collect();
        if self.content.chars().count() > 80 {
            format!("{truncated}...")
        } else {
            truncated
        }
    }
}

/// Quarantined contribution awaiting operator review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingContribution {
    pub id: Uuid,
    pub tenant_id: String,
    pub source_agent_id: String,
    pub run_id: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub category: KnowledgeCategory,
    pub confidence: f32,
    pub framework: Option<String>,
    pub language: Option<String>,
    pub version: Option<String>,
    pub tags: Option<serde_json::Value>,
    pub contributed_at: DateTime<Utc>,
    pub is_sensitive_flagged: bool,
}

/// Append-only behavioral event against a knowledge item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySignal {
    pub id: Uuid,
    pub knowledge_item_id: Uuid,
    pub signal_type: SignalType,
    pub agent_id: Option<String>,
    pub run_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Credential record for an opaque `hm_`-prefixed API key
///
/// Stores the displayable prefix and the SHA-256 of the full key; the raw
/// key is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub key_prefix: String,
    pub key_hash: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub tier: Tier,
    pub request_count: i64,
    pub billing_period_start: DateTime<Utc>,
    pub billing_period_reset_days: i64,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Registered webhook delivery target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub tenant_id: String,
    pub url: String,
    /// Subscribed event types; `None` means all events
    pub event_types: Option<Vec<String>>,
    pub is_active: bool,
}

impl WebhookEndpoint {
    /// True when this endpoint subscribes to the given event type
    pub fn accepts(&self, event: &str) -> bool {
        match &self.event_types {
            None => true,
            Some(types) => types.is_empty() || types.iter().any(|t| t == event),
        }
    }
}

/// Summary-tier search result (~30-50 tokens per entry)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSummary {
    pub id: Uuid,
    pub title: String,
    pub category: KnowledgeCategory,
    pub confidence: f32,
    pub tenant_attribution: String,
    /// Quality-boosted RRF final score
    pub relevance_score: f64,
}

/// One page of hybrid search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage {
    pub results: Vec<KnowledgeSummary>,
    pub total_found: i64,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item_with_content(content: &str) -> KnowledgeItem {
        KnowledgeItem {
            id: Uuid::new_v4(),
            tenant_id: "acme".to_string(),
            is_public: false,
            source_agent_id: "agent-1".to_string(),
            run_id: None,
            content: content.to_string(),
            content_hash: String::new(),
            category: KnowledgeCategory::General,
            confidence: 0.8,
            framework: None,
            language: None,
            version: None,
            tags: None,
            embedding: None,
            quality_score: 0.5,
            retrieval_count: 0,
            helpful_count: 0,
            not_helpful_count: 0,
            contributed_at: Utc::now(),
            approved_at: None,
            expired_at: None,
            valid_at: None,
            invalid_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn category_round_trips_through_str() {
        for cat in KnowledgeCategory::ALL {
            let parsed: KnowledgeCategory = cat.as_str().parse().unwrap();
            assert_eq!(parsed, cat);
        }
    }

    #[test]
    fn invalid_category_lists_valid_values() {
        let err = "nonsense".parse::<KnowledgeCategory>().unwrap_err();
        assert!(err.contains("bug_fix"));
        assert!(err.contains("general"));
    }

    #[test]
    fn title_truncates_at_80_chars() {
        let short = item_with_content("short content");
        assert_eq!(short.title(), "short content");

        let long = item_with_content(&"x".repeat(120));
        let title = long.title();
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 83);
    }

    #[test]
    fn tier_quotas_match_documented_limits() {
        assert_eq!(Tier::Free.contributions_per_minute(), 10);
        assert_eq!(Tier::Free.searches_per_minute(), 30);
        assert_eq!(Tier::Pro.contributions_per_minute(), 60);
        assert_eq!(Tier::Pro.searches_per_minute(), 200);
        assert_eq!(Tier::Enterprise.contributions_per_minute(), 300);
        assert_eq!(Tier::Enterprise.searches_per_minute(), 1000);
    }

    #[test]
    fn endpoint_event_subscription_filter() {
        let mut ep = WebhookEndpoint {
            id: Uuid::new_v4(),
            tenant_id: "acme".to_string(),
            url: "https://example.com/hook".to_string(),
            event_types: None,
            is_active: true,
        };
        assert!(ep.accepts("knowledge.approved"));

        ep.event_types = Some(vec!["knowledge.approved".to_string()]);
        assert!(ep.accepts("knowledge.approved"));
        assert!(!ep.accepts("knowledge.published"));
    }
}
