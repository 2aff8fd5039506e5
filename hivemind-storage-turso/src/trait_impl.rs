//! `KnowledgeStore` trait implementation delegating to the inherent methods

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hivemind_core::storage::{
    AgentStats, ClusterableItem, CommonsStats, ContributionListing, DuplicateGroup,
    KnowledgeStore, PolicyRule, SearchRequest, SignalCounts, SimilarItem, TenantStats,
};
use hivemind_core::types::{
    ApiKeyRecord, KnowledgeCategory, KnowledgeItem, PendingContribution, QualitySignal,
    SearchPage, WebhookEndpoint,
};
use hivemind_core::Result;
use uuid::Uuid;

use crate::TursoStorage;

#[async_trait]
impl KnowledgeStore for TursoStorage {
    async fn insert_item(&self, item: &KnowledgeItem) -> Result<()> {
        TursoStorage::insert_item(self, item).await
    }

    async fn get_item(&self, id: Uuid, tenant_id: &str) -> Result<Option<KnowledgeItem>> {
        TursoStorage::get_item(self, id, tenant_id).await
    }

    async fn get_item_any(&self, id: Uuid) -> Result<Option<KnowledgeItem>> {
        TursoStorage::get_item_any(self, id).await
    }

    async fn soft_delete_item(&self, id: Uuid, tenant_id: &str, agent_id: &str) -> Result<bool> {
        TursoStorage::soft_delete_item(self, id, tenant_id, agent_id).await
    }

    async fn supersede_item(&self, id: Uuid, tenant_id: &str, at: DateTime<Utc>) -> Result<()> {
        TursoStorage::supersede_item(self, id, tenant_id, at).await
    }

    async fn invalidate_item(&self, id: Uuid, tenant_id: &str, at: DateTime<Utc>) -> Result<()> {
        TursoStorage::invalidate_item(self, id, tenant_id, at).await
    }

    async fn set_item_public(
        &self,
        id: Uuid,
        tenant_id: &str,
        agent_id: &str,
        is_public: bool,
    ) -> Result<bool> {
        TursoStorage::set_item_public(self, id, tenant_id, agent_id, is_public).await
    }

    async fn increment_retrieval_counts(&self, ids: &[Uuid]) -> Result<()> {
        TursoStorage::increment_retrieval_counts(self, ids).await
    }

    async fn increment_outcome_counter(&self, id: Uuid, helpful: bool) -> Result<()> {
        TursoStorage::increment_outcome_counter(self, id, helpful).await
    }

    async fn update_quality_score(&self, id: Uuid, score: f32) -> Result<()> {
        TursoStorage::update_quality_score(self, id, score).await
    }

    async fn update_item_tags(&self, id: Uuid, tags: &serde_json::Value) -> Result<()> {
        TursoStorage::update_item_tags(self, id, tags).await
    }

    async fn find_similar_items(
        &self,
        embedding: &[f32],
        tenant_id: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarItem>> {
        TursoStorage::find_similar_items(self, embedding, tenant_id, top_k).await
    }

    async fn search_knowledge(&self, request: &SearchRequest) -> Result<SearchPage> {
        TursoStorage::search_knowledge(self, request).await
    }

    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        TursoStorage::duplicate_groups(self).await
    }

    async fn clusterable_items(&self) -> Result<Vec<ClusterableItem>> {
        TursoStorage::clusterable_items(self).await
    }

    async fn current_item_contents(&self) -> Result<Vec<(Uuid, String)>> {
        TursoStorage::current_item_contents(self).await
    }

    async fn list_contributions(
        &self,
        tenant_id: &str,
        agent_id: &str,
        status: &str,
        category: Option<KnowledgeCategory>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<ContributionListing>, i64)> {
        TursoStorage::list_contributions(self, tenant_id, agent_id, status, category, limit, offset)
            .await
    }

    async fn insert_pending(&self, contribution: &PendingContribution) -> Result<()> {
        TursoStorage::insert_pending(self, contribution).await
    }

    async fn get_pending(&self, id: Uuid, tenant_id: &str) -> Result<Option<PendingContribution>> {
        TursoStorage::get_pending(self, id, tenant_id).await
    }

    async fn claim_pending_for_review(
        &self,
        tenant_id: &str,
        limit: usize,
        claim_ttl_secs: u64,
    ) -> Result<Vec<PendingContribution>> {
        TursoStorage::claim_pending_for_review(self, tenant_id, limit, claim_ttl_secs).await
    }

    async fn delete_pending(&self, id: Uuid) -> Result<bool> {
        TursoStorage::delete_pending(self, id).await
    }

    async fn count_pending(&self) -> Result<i64> {
        TursoStorage::count_pending(self).await
    }

    async fn unflagged_pending(&self) -> Result<Vec<PendingContribution>> {
        TursoStorage::unflagged_pending(self).await
    }

    async fn flag_pending_sensitive(&self, id: Uuid, tags: &serde_json::Value) -> Result<()> {
        TursoStorage::flag_pending_sensitive(self, id, tags).await
    }

    async fn record_signal(&self, signal: &QualitySignal) -> Result<()> {
        TursoStorage::record_signal(self, signal).await
    }

    async fn find_outcome_signal(&self, item_id: Uuid, run_id: &str) -> Result<Option<Uuid>> {
        TursoStorage::find_outcome_signal(self, item_id, run_id).await
    }

    async fn items_with_signals_since(&self, since: DateTime<Utc>) -> Result<Vec<Uuid>> {
        TursoStorage::items_with_signals_since(self, since).await
    }

    async fn signal_counts(&self, item_id: Uuid) -> Result<SignalCounts> {
        TursoStorage::signal_counts(self, item_id).await
    }

    async fn last_retrieval_at(&self, item_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        TursoStorage::last_retrieval_at(self, item_id).await
    }

    async fn contradiction_signals_since(&self, since: DateTime<Utc>) -> Result<i64> {
        TursoStorage::contradiction_signals_since(self, since).await
    }

    async fn contradiction_flagged_items(
        &self,
    ) -> Result<Vec<(Uuid, KnowledgeCategory, String)>> {
        TursoStorage::contradiction_flagged_items(self).await
    }

    async fn is_auto_approved(
        &self,
        tenant_id: &str,
        category: KnowledgeCategory,
    ) -> Result<bool> {
        TursoStorage::is_auto_approved(self, tenant_id, category).await
    }

    async fn set_auto_approve(
        &self,
        tenant_id: &str,
        category: KnowledgeCategory,
        enabled: bool,
    ) -> Result<()> {
        TursoStorage::set_auto_approve(self, tenant_id, category, enabled).await
    }

    async fn insert_api_key(&self, record: &ApiKeyRecord) -> Result<()> {
        TursoStorage::insert_api_key(self, record).await
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        TursoStorage::find_api_key_by_hash(self, key_hash).await
    }

    async fn reset_billing_period(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        TursoStorage::reset_billing_period(self, id, now).await
    }

    async fn increment_request_count(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        TursoStorage::increment_request_count(self, id, now).await
    }

    async fn insert_webhook_endpoint(&self, endpoint: &WebhookEndpoint) -> Result<()> {
        TursoStorage::insert_webhook_endpoint(self, endpoint).await
    }

    async fn active_webhook_endpoints(&self, tenant_id: &str) -> Result<Vec<WebhookEndpoint>> {
        TursoStorage::active_webhook_endpoints(self, tenant_id).await
    }

    async fn add_policy(&self, rule: &PolicyRule) -> Result<bool> {
        TursoStorage::add_policy(self, rule).await
    }

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool> {
        TursoStorage::remove_policy(self, rule).await
    }

    async fn policies_for_domain(&self, domain: &str) -> Result<Vec<PolicyRule>> {
        TursoStorage::policies_for_domain(self, domain).await
    }

    async fn add_role_binding(&self, subject: &str, role: &str, domain: &str) -> Result<bool> {
        TursoStorage::add_role_binding(self, subject, role, domain).await
    }

    async fn roles_for_subject(&self, subject: &str, domain: &str) -> Result<Vec<String>> {
        TursoStorage::roles_for_subject(self, subject, domain).await
    }

    async fn get_config(&self, key: &str) -> Result<Option<String>> {
        TursoStorage::get_config(self, key).await
    }

    async fn upsert_config(&self, key: &str, value: &str) -> Result<()> {
        TursoStorage::upsert_config(self, key, value).await
    }

    async fn commons_stats(&self) -> Result<CommonsStats> {
        TursoStorage::commons_stats(self).await
    }

    async fn tenant_stats(&self, tenant_id: &str) -> Result<TenantStats> {
        TursoStorage::tenant_stats(self, tenant_id).await
    }

    async fn agent_stats(&self, tenant_id: &str, agent_id: &str) -> Result<AgentStats> {
        TursoStorage::agent_stats(self, tenant_id, agent_id).await
    }
}
