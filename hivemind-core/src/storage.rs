//! Storage abstraction
//!
//! Unified trait for the knowledge-commons storage backend. Domain logic
//! (ingestion, dedup, quality jobs, tools) talks to this trait only; the
//! libSQL implementation lives in the `hivemind-storage-turso` crate.
//!
//! Tenant scoping is part of the contract: every read that serves a caller
//! takes the caller's tenant and returns only that tenant's rows plus the
//! public commons. Cross-tenant private rows behave as if they do not exist.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    ApiKeyRecord, KnowledgeCategory, KnowledgeItem, PendingContribution, QualitySignal,
    SearchPage, WebhookEndpoint,
};
use crate::Result;

/// Stage-1 dedup candidate returned by the vector search
#[derive(Debug, Clone)]
pub struct SimilarItem {
    pub id: Uuid,
    pub content: String,
    pub content_hash: String,
    /// Cosine distance to the probe embedding (lower = more similar)
    pub distance: f32,
    pub category: KnowledgeCategory,
    pub version: Option<String>,
}

/// Parameters for the hybrid retriever
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub embedding: Vec<f32>,
    pub tenant_id: String,
    pub category: Option<KnowledgeCategory>,
    pub limit: usize,
    pub offset: usize,
    /// Point-in-time filter (world-time + current system-time rows only)
    pub at_time: Option<DateTime<Utc>>,
    /// Version filter; only applied together with `at_time`
    pub version: Option<String>,
}

/// Aggregated signal counts for one item
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalCounts {
    pub total: i64,
    pub contradictions: i64,
}

/// Group of current items sharing (content_hash, tenant_id)
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub content_hash: String,
    pub tenant_id: String,
    /// Member ids ordered by quality_score descending; first is canonical
    pub ids: Vec<Uuid>,
}

/// Current item projected for distillation clustering
#[derive(Debug, Clone)]
pub struct ClusterableItem {
    pub id: Uuid,
    pub tenant_id: String,
    pub category: KnowledgeCategory,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// An RBAC policy tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub subject: String,
    pub domain: String,
    pub object: String,
    pub action: String,
}

/// One page of a tenant's own contributions (pending and approved)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionListing {
    pub id: Uuid,
    pub status: String,
    pub category: KnowledgeCategory,
    pub title: String,
    pub contributed_at: DateTime<Utc>,
    pub is_public: Option<bool>,
}

/// Commons-wide aggregate counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommonsStats {
    pub total_items: i64,
    pub public_items: i64,
    pub pending_contributions: i64,
    pub total_signals: i64,
}

/// Per-tenant aggregate counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantStats {
    pub tenant_id: String,
    pub total_items: i64,
    pub public_items: i64,
    pub pending_contributions: i64,
    pub avg_quality_score: f64,
}

/// Per-agent aggregate counters within a tenant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStats {
    pub tenant_id: String,
    pub agent_id: String,
    pub contributed_items: i64,
    pub helpful_count: i64,
    pub not_helpful_count: i64,
}

/// Unified storage backend trait for the knowledge commons
///
/// All operations are async; each implementation method uses its own
/// connection/transaction, so no request-scoped state is shared.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    // ========== Knowledge items ==========

    /// Insert an approved knowledge item
    async fn insert_item(&self, item: &KnowledgeItem) -> Result<()>;

    /// Fetch one item by id, scoped to the caller's tenant + public commons;
    /// soft-deleted rows are invisible
    async fn get_item(&self, id: Uuid, tenant_id: &str) -> Result<Option<KnowledgeItem>>;

    /// Fetch one item by id with no tenant scope (background jobs only)
    async fn get_item_any(&self, id: Uuid) -> Result<Option<KnowledgeItem>>;

    /// Soft-delete an item; only the creating agent within its tenant may
    /// delete. Returns false when no row matched.
    async fn soft_delete_item(&self, id: Uuid, tenant_id: &str, agent_id: &str) -> Result<bool>;

    /// System-time supersede: set `expired_at` (row is retained)
    async fn supersede_item(&self, id: Uuid, tenant_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// World-time end: set `invalid_at`
    async fn invalidate_item(&self, id: Uuid, tenant_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Toggle public visibility; only the creating agent within its tenant.
    /// Returns false when no row matched.
    async fn set_item_public(
        &self,
        id: Uuid,
        tenant_id: &str,
        agent_id: &str,
        is_public: bool,
    ) -> Result<bool>;

    /// Atomically bump `retrieval_count` for all given ids in one statement
    async fn increment_retrieval_counts(&self, ids: &[Uuid]) -> Result<()>;

    /// Atomically bump `helpful_count` or `not_helpful_count`
    async fn increment_outcome_counter(&self, id: Uuid, helpful: bool) -> Result<()>;

    /// Write back an aggregated quality score
    async fn update_quality_score(&self, id: Uuid, score: f32) -> Result<()>;

    /// Replace an item's tags payload
    async fn update_item_tags(&self, id: Uuid, tags: &serde_json::Value) -> Result<()>;

    /// Vector search for dedup Stage 1: top-k current, non-deleted items
    /// visible to the tenant, ordered by cosine distance ascending
    async fn find_similar_items(
        &self,
        embedding: &[f32],
        tenant_id: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarItem>>;

    /// Hybrid BM25+vector RRF search with quality boosting; one SQL statement
    async fn search_knowledge(&self, request: &SearchRequest) -> Result<SearchPage>;

    /// Current (non-expired, non-deleted) duplicate groups by
    /// (content_hash, tenant_id), members ordered by quality descending
    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>>;

    /// All current items carrying embeddings, for distillation clustering
    async fn clusterable_items(&self) -> Result<Vec<ClusterableItem>>;

    /// (id, content) of every current item, for LSH index rebuild
    async fn current_item_contents(&self) -> Result<Vec<(Uuid, String)>>;

    /// The caller's own contributions merged across pending + approved,
    /// optionally narrowed to one category
    async fn list_contributions(
        &self,
        tenant_id: &str,
        agent_id: &str,
        status: &str,
        category: Option<KnowledgeCategory>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<ContributionListing>, i64)>;

    // ========== Pending queue ==========

    /// Insert a quarantined contribution
    async fn insert_pending(&self, contribution: &PendingContribution) -> Result<()>;

    /// Fetch one pending contribution by id within a tenant
    async fn get_pending(&self, id: Uuid, tenant_id: &str) -> Result<Option<PendingContribution>>;

    /// Claim up to `limit` unclaimed pending rows of a tenant for review
    ///
    /// Claimed rows are invisible to other reviewers until the claim TTL
    /// lapses, so two reviewers never receive the same row; released claims
    /// rejoin the queue.
    async fn claim_pending_for_review(
        &self,
        tenant_id: &str,
        limit: usize,
        claim_ttl_secs: u64,
    ) -> Result<Vec<PendingContribution>>;

    /// Remove a pending row (after promotion or rejection).
    /// Returns false when no row matched.
    async fn delete_pending(&self, id: Uuid) -> Result<bool>;

    /// Total pending rows
    async fn count_pending(&self) -> Result<i64>;

    /// Pending rows not yet flagged sensitive (distillation pre-screen)
    async fn unflagged_pending(&self) -> Result<Vec<PendingContribution>>;

    /// Flag a pending row sensitive and replace its tags
    async fn flag_pending_sensitive(&self, id: Uuid, tags: &serde_json::Value) -> Result<()>;

    // ========== Quality signals ==========

    /// Append one behavioral signal
    async fn record_signal(&self, signal: &QualitySignal) -> Result<()>;

    /// Existing outcome signal id for (item, run), if any — idempotency check
    async fn find_outcome_signal(&self, item_id: Uuid, run_id: &str) -> Result<Option<Uuid>>;

    /// Distinct item ids with signals newer than the watermark
    async fn items_with_signals_since(&self, since: DateTime<Utc>) -> Result<Vec<Uuid>>;

    /// Total and contradiction signal counts for one item
    async fn signal_counts(&self, item_id: Uuid) -> Result<SignalCounts>;

    /// Timestamp of the latest retrieval signal for one item
    async fn last_retrieval_at(&self, item_id: Uuid) -> Result<Option<DateTime<Utc>>>;

    /// Count of contradiction signals created after the watermark
    async fn contradiction_signals_since(&self, since: DateTime<Utc>) -> Result<i64>;

    /// Current items carrying at least one contradiction signal, with their
    /// category and tenant for clustering
    async fn contradiction_flagged_items(
        &self,
    ) -> Result<Vec<(Uuid, KnowledgeCategory, String)>>;

    // ========== Auto-approve rules ==========

    /// True when the tenant auto-approves this category
    async fn is_auto_approved(&self, tenant_id: &str, category: KnowledgeCategory)
        -> Result<bool>;

    /// Upsert an auto-approve rule
    async fn set_auto_approve(
        &self,
        tenant_id: &str,
        category: KnowledgeCategory,
        enabled: bool,
    ) -> Result<()>;

    // ========== API keys ==========

    /// Persist a new API key record (hash only; the raw key is never stored)
    async fn insert_api_key(&self, record: &ApiKeyRecord) -> Result<()>;

    /// Look up a key record by SHA-256 hash of the presented key
    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>>;

    /// Reset the billing window and zero the request counter
    async fn reset_billing_period(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Bump the usage counter and stamp `last_used_at`
    async fn increment_request_count(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    // ========== Webhook endpoints ==========

    /// Register a webhook endpoint
    async fn insert_webhook_endpoint(&self, endpoint: &WebhookEndpoint) -> Result<()>;

    /// Active endpoints for a tenant
    async fn active_webhook_endpoints(&self, tenant_id: &str) -> Result<Vec<WebhookEndpoint>>;

    // ========== Authorization policies ==========

    /// Add a policy rule; returns false when it already existed
    async fn add_policy(&self, rule: &PolicyRule) -> Result<bool>;

    /// Remove a policy rule; returns false when it did not exist
    async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool>;

    /// All policy rules scoped to a domain
    async fn policies_for_domain(&self, domain: &str) -> Result<Vec<PolicyRule>>;

    /// Bind a role to a subject within a domain; returns false when the
    /// binding already existed
    async fn add_role_binding(&self, subject: &str, role: &str, domain: &str) -> Result<bool>;

    /// Roles bound to a subject within a domain
    async fn roles_for_subject(&self, subject: &str, domain: &str) -> Result<Vec<String>>;

    // ========== Deployment config ==========

    /// Read a deployment-config value
    async fn get_config(&self, key: &str) -> Result<Option<String>>;

    /// Insert or update a deployment-config value
    async fn upsert_config(&self, key: &str, value: &str) -> Result<()>;

    // ========== Stats ==========

    /// Commons-wide aggregates
    async fn commons_stats(&self) -> Result<CommonsStats>;

    /// Per-tenant aggregates
    async fn tenant_stats(&self, tenant_id: &str) -> Result<TenantStats>;

    /// Per-agent aggregates within a tenant
    async fn agent_stats(&self, tenant_id: &str, agent_id: &str) -> Result<AgentStats>;
}
