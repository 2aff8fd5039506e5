#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Integration tests against a temp-file libSQL database

use chrono::{Duration, Utc};
use hivemind_core::storage::{PolicyRule, SearchRequest};
use hivemind_core::types::{
    ApiKeyRecord, KnowledgeCategory, KnowledgeItem, PendingContribution, QualitySignal,
    SignalType, Tier, WebhookEndpoint,
};
use hivemind_core::{compute_content_hash, Embedder};
use uuid::Uuid;

use crate::TursoStorage;

struct TestDb {
    storage: TursoStorage,
    // Held so the database file outlives the storage
    _dir: tempfile::TempDir,
}

async fn test_storage() -> TestDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("test.db");
    let storage = TursoStorage::open_local(path.to_str().expect("utf-8 path"))
        .await
        .expect("open db");
    storage.initialize_schema().await.expect("schema");
    TestDb {
        storage,
        _dir: dir,
    }
}

fn make_item(tenant: &str, agent: &str, content: &str) -> KnowledgeItem {
    let embedder = Embedder::default();
    let now = Utc::now();
    KnowledgeItem {
        id: Uuid::new_v4(),
        tenant_id: tenant.to_string(),
        is_public: false,
        source_agent_id: agent.to_string(),
        run_id: None,
        content: content.to_string(),
        content_hash: compute_content_hash(content),
        category: KnowledgeCategory::General,
        confidence: 0.8,
        framework: None,
        language: None,
        version: None,
        tags: None,
        embedding: Some(embedder.embed(content)),
        quality_score: 0.5,
        retrieval_count: 0,
        helpful_count: 0,
        not_helpful_count: 0,
        contributed_at: now,
        approved_at: Some(now),
        expired_at: None,
        valid_at: None,
        invalid_at: None,
        deleted_at: None,
    }
}

fn make_pending(tenant: &str, agent: &str, content: &str) -> PendingContribution {
    PendingContribution {
        id: Uuid::new_v4(),
        tenant_id: tenant.to_string(),
        source_agent_id: agent.to_string(),
        run_id: None,
        content: content.to_string(),
        content_hash: compute_content_hash(content),
        category: KnowledgeCategory::General,
        confidence: 0.8,
        framework: None,
        language: None,
        version: None,
        tags: None,
        contributed_at: Utc::now(),
        is_sensitive_flagged: false,
    }
}

fn search_request(tenant: &str, query: &str) -> SearchRequest {
    let embedder = Embedder::default();
    SearchRequest {
        query: query.to_string(),
        embedding: embedder.embed(query),
        tenant_id: tenant.to_string(),
        category: None,
        limit: 10,
        offset: 0,
        at_time: None,
        version: None,
    }
}

#[tokio::test]
async fn item_round_trip() {
    let db = test_storage().await;
    let mut item = make_item("acme", "agent-1", "Retry the webhook with exponential backoff.");
    item.tags = Some(serde_json::json!({"tags": ["networking"]}));
    db.storage.insert_item(&item).await.unwrap();

    let fetched = db
        .storage
        .get_item(item.id, "acme")
        .await
        .unwrap()
        .expect("item exists");
    assert_eq!(fetched.content, item.content);
    assert_eq!(fetched.content_hash, item.content_hash);
    assert_eq!(fetched.category, KnowledgeCategory::General);
    assert_eq!(fetched.tags, item.tags);
    let embedding = fetched.embedding.expect("embedding stored");
    assert_eq!(embedding.len(), 384);
}

#[tokio::test]
async fn cross_tenant_private_item_is_invisible() {
    let db = test_storage().await;
    let item = make_item("acme", "agent-1", "Private tenant knowledge goes nowhere else.");
    db.storage.insert_item(&item).await.unwrap();

    assert!(db.storage.get_item(item.id, "acme").await.unwrap().is_some());
    // Another tenant sees exactly what a nonexistent id yields
    assert!(db.storage.get_item(item.id, "globex").await.unwrap().is_none());
    assert!(db
        .storage
        .get_item(Uuid::new_v4(), "globex")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn public_item_is_visible_across_tenants() {
    let db = test_storage().await;
    let mut item = make_item("acme", "agent-1", "Shared knowledge for the whole commons.");
    item.is_public = true;
    db.storage.insert_item(&item).await.unwrap();

    assert!(db.storage.get_item(item.id, "globex").await.unwrap().is_some());
}

#[tokio::test]
async fn soft_delete_hides_item_but_keeps_row() {
    let db = test_storage().await;
    let item = make_item("acme", "agent-1", "Ephemeral knowledge to be deleted soon.");
    db.storage.insert_item(&item).await.unwrap();

    // Wrong agent cannot delete
    assert!(!db
        .storage
        .soft_delete_item(item.id, "acme", "other-agent")
        .await
        .unwrap());
    // Creating agent can
    assert!(db
        .storage
        .soft_delete_item(item.id, "acme", "agent-1")
        .await
        .unwrap());

    assert!(db.storage.get_item(item.id, "acme").await.unwrap().is_none());
    // Row retained for audit
    let any = db.storage.get_item_any(item.id).await.unwrap().expect("row kept");
    assert!(any.deleted_at.is_some());
}

#[tokio::test]
async fn duplicate_hash_within_tenant_is_rejected() {
    let db = test_storage().await;
    let item_a = make_item("acme", "agent-1", "The same content exactly, twice over.");
    let mut item_b = make_item("acme", "agent-2", "The same content exactly, twice over.");
    item_b.id = Uuid::new_v4();

    db.storage.insert_item(&item_a).await.unwrap();
    assert!(db.storage.insert_item(&item_b).await.is_err());

    // Identical content in a different tenant is allowed
    let item_c = make_item("globex", "agent-3", "The same content exactly, twice over.");
    db.storage.insert_item(&item_c).await.unwrap();
}

#[tokio::test]
async fn superseded_item_frees_the_hash_slot() {
    let db = test_storage().await;
    let item_a = make_item("acme", "agent-1", "Current version of this fact right here.");
    db.storage.insert_item(&item_a).await.unwrap();
    db.storage
        .supersede_item(item_a.id, "acme", Utc::now())
        .await
        .unwrap();

    // A new current row with the same hash is fine once the old one expired
    let mut item_b = make_item("acme", "agent-1", "Current version of this fact right here.");
    item_b.id = Uuid::new_v4();
    db.storage.insert_item(&item_b).await.unwrap();
}

#[tokio::test]
async fn retrieval_counter_batch_increment() {
    let db = test_storage().await;
    let item_a = make_item("acme", "agent-1", "First knowledge item for counter testing.");
    let item_b = make_item("acme", "agent-1", "Second knowledge item for counter testing.");
    db.storage.insert_item(&item_a).await.unwrap();
    db.storage.insert_item(&item_b).await.unwrap();

    db.storage
        .increment_retrieval_counts(&[item_a.id, item_b.id])
        .await
        .unwrap();
    db.storage
        .increment_retrieval_counts(&[item_a.id])
        .await
        .unwrap();

    let a = db.storage.get_item_any(item_a.id).await.unwrap().unwrap();
    let b = db.storage.get_item_any(item_b.id).await.unwrap().unwrap();
    assert_eq!(a.retrieval_count, 2);
    assert_eq!(b.retrieval_count, 1);
}

#[tokio::test]
async fn hybrid_search_finds_relevant_content() {
    let db = test_storage().await;
    db.storage
        .insert_item(&make_item(
            "acme",
            "agent-1",
            "Configure the database connection pool size to twenty for steady throughput.",
        ))
        .await
        .unwrap();
    db.storage
        .insert_item(&make_item(
            "acme",
            "agent-1",
            "The billing API rejects requests without an idempotency key header.",
        ))
        .await
        .unwrap();

    let page = db
        .storage
        .search_knowledge(&search_request("acme", "database connection pool"))
        .await
        .unwrap();

    assert!(!page.results.is_empty());
    assert!(page.results[0].title.contains("connection pool"));
    assert!(page.results[0].relevance_score > 0.0);
}

#[tokio::test]
async fn search_excludes_soft_deleted_and_foreign_private() {
    let db = test_storage().await;
    let deleted = make_item("acme", "agent-1", "Soft deleted knowledge about retries and backoff.");
    db.storage.insert_item(&deleted).await.unwrap();
    db.storage
        .soft_delete_item(deleted.id, "acme", "agent-1")
        .await
        .unwrap();

    let foreign = make_item("globex", "agent-2", "Foreign private knowledge about retries and backoff.");
    db.storage.insert_item(&foreign).await.unwrap();

    let page = db
        .storage
        .search_knowledge(&search_request("acme", "retries backoff"))
        .await
        .unwrap();
    assert!(page.results.is_empty());
}

#[tokio::test]
async fn search_quality_boost_orders_equal_relevance() {
    let db = test_storage().await;
    let mut low = make_item("acme", "agent-1", "Cache invalidation strategy for the gateway tier.");
    low.quality_score = 0.1;
    let mut high = make_item("acme", "agent-1", "Cache invalidation strategy for the edge tier.");
    high.quality_score = 0.9;
    db.storage.insert_item(&low).await.unwrap();
    db.storage.insert_item(&high).await.unwrap();

    let page = db
        .storage
        .search_knowledge(&search_request("acme", "cache invalidation strategy"))
        .await
        .unwrap();

    assert_eq!(page.results.len(), 2);
    assert_eq!(page.results[0].id, high.id, "higher quality must rank first");
    assert!(page.results[0].relevance_score >= page.results[1].relevance_score);
}

#[tokio::test]
async fn search_deduplicates_by_content_hash() {
    let db = test_storage().await;
    let mut private = make_item("acme", "agent-1", "Identical public and private knowledge entry.");
    private.quality_score = 0.9;
    db.storage.insert_item(&private).await.unwrap();

    let mut public = make_item("globex", "agent-2", "Identical public and private knowledge entry.");
    public.is_public = true;
    public.quality_score = 0.1;
    db.storage.insert_item(&public).await.unwrap();

    let page = db
        .storage
        .search_knowledge(&search_request("acme", "identical public private knowledge"))
        .await
        .unwrap();

    assert_eq!(page.results.len(), 1, "duplicates collapse to one entry");
    assert_eq!(page.results[0].tenant_attribution, "acme");
}

#[tokio::test]
async fn point_in_time_search_applies_world_time() {
    let db = test_storage().await;
    let t1 = Utc::now() - Duration::days(10);
    let t2 = Utc::now() - Duration::days(5);

    let mut item = make_item("acme", "agent-1", "Versioned pricing rule for the enterprise plan.");
    item.valid_at = Some(t1);
    item.invalid_at = Some(t2);
    db.storage.insert_item(&item).await.unwrap();

    let mut inside = search_request("acme", "pricing rule enterprise");
    inside.at_time = Some(t1 + Duration::days(2));
    let page = db.storage.search_knowledge(&inside).await.unwrap();
    assert_eq!(page.results.len(), 1);

    let mut after = search_request("acme", "pricing rule enterprise");
    after.at_time = Some(t2 + Duration::days(2));
    let page = db.storage.search_knowledge(&after).await.unwrap();
    assert!(page.results.is_empty());
}

#[tokio::test]
async fn null_valid_at_is_always_eligible() {
    let db = test_storage().await;
    let item = make_item("acme", "agent-1", "Backfilled knowledge with no world-time start.");
    db.storage.insert_item(&item).await.unwrap();

    let mut request = search_request("acme", "backfilled knowledge world");
    request.at_time = Some(Utc::now() - Duration::days(365));
    let page = db.storage.search_knowledge(&request).await.unwrap();
    assert_eq!(page.results.len(), 1);
}

#[tokio::test]
async fn find_similar_items_orders_by_distance() {
    let db = test_storage().await;
    db.storage
        .insert_item(&make_item(
            "acme",
            "agent-1",
            "Set the worker pool size to eight for the ingest queue.",
        ))
        .await
        .unwrap();
    db.storage
        .insert_item(&make_item(
            "acme",
            "agent-1",
            "Completely unrelated note about office plants and watering.",
        ))
        .await
        .unwrap();

    let embedder = Embedder::default();
    let probe = embedder.embed("Set the worker pool size to eight for the ingest queue.");
    let candidates = db
        .storage
        .find_similar_items(&probe, "acme", 10)
        .await
        .unwrap();

    assert_eq!(candidates.len(), 2);
    assert!(candidates[0].distance <= candidates[1].distance);
    assert!(candidates[0].distance < 0.01, "identical text should be near zero distance");
}

#[tokio::test]
async fn pending_queue_claim_discipline() {
    let db = test_storage().await;
    let first = make_pending("acme", "agent-1", "First pending contribution in the queue.");
    let second = make_pending("acme", "agent-1", "Second pending contribution in the queue.");
    db.storage.insert_pending(&first).await.unwrap();
    db.storage.insert_pending(&second).await.unwrap();

    let claimed = db
        .storage
        .claim_pending_for_review("acme", 1, 300)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, first.id, "oldest row claims first");

    // A second reviewer must not receive the already-claimed row
    let claimed_again = db
        .storage
        .claim_pending_for_review("acme", 5, 300)
        .await
        .unwrap();
    assert_eq!(claimed_again.len(), 1);
    assert_eq!(claimed_again[0].id, second.id);

    // Another tenant's reviewer sees nothing
    assert!(db
        .storage
        .claim_pending_for_review("globex", 5, 0)
        .await
        .unwrap()
        .is_empty());

    // A zero TTL releases the claims immediately
    let reclaimed = db
        .storage
        .claim_pending_for_review("acme", 5, 0)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 2);
}

#[tokio::test]
async fn pending_prescreen_flagging() {
    let db = test_storage().await;
    let pending = make_pending("acme", "agent-1", "Contribution awaiting the quality pre-screen.");
    db.storage.insert_pending(&pending).await.unwrap();

    assert_eq!(db.storage.unflagged_pending().await.unwrap().len(), 1);

    let tags = serde_json::json!({"low_quality_prescreened": true, "preliminary_quality_score": 0.1});
    db.storage
        .flag_pending_sensitive(pending.id, &tags)
        .await
        .unwrap();

    assert!(db.storage.unflagged_pending().await.unwrap().is_empty());
    let flagged = db
        .storage
        .get_pending(pending.id, "acme")
        .await
        .unwrap()
        .unwrap();
    assert!(flagged.is_sensitive_flagged);
    assert_eq!(flagged.tags, Some(tags));
}

#[tokio::test]
async fn signal_log_and_outcome_idempotency_check() {
    let db = test_storage().await;
    let item = make_item("acme", "agent-1", "Knowledge item receiving behavioral signals.");
    db.storage.insert_item(&item).await.unwrap();

    let signal = QualitySignal {
        id: Uuid::new_v4(),
        knowledge_item_id: item.id,
        signal_type: SignalType::OutcomeSolved,
        agent_id: Some("agent-2".to_string()),
        run_id: Some("run-42".to_string()),
        metadata: None,
        created_at: Utc::now(),
    };
    db.storage.record_signal(&signal).await.unwrap();

    let existing = db
        .storage
        .find_outcome_signal(item.id, "run-42")
        .await
        .unwrap();
    assert_eq!(existing, Some(signal.id));
    assert!(db
        .storage
        .find_outcome_signal(item.id, "run-other")
        .await
        .unwrap()
        .is_none());

    let counts = db.storage.signal_counts(item.id).await.unwrap();
    assert_eq!(counts.total, 1);
    assert_eq!(counts.contradictions, 0);

    let since_epoch = db
        .storage
        .items_with_signals_since(chrono::DateTime::UNIX_EPOCH)
        .await
        .unwrap();
    assert_eq!(since_epoch, vec![item.id]);
}

#[tokio::test]
async fn auto_approve_rules_round_trip() {
    let db = test_storage().await;
    assert!(!db
        .storage
        .is_auto_approved("acme", KnowledgeCategory::Tooling)
        .await
        .unwrap());

    db.storage
        .set_auto_approve("acme", KnowledgeCategory::Tooling, true)
        .await
        .unwrap();
    assert!(db
        .storage
        .is_auto_approved("acme", KnowledgeCategory::Tooling)
        .await
        .unwrap());
    // Other categories stay off
    assert!(!db
        .storage
        .is_auto_approved("acme", KnowledgeCategory::General)
        .await
        .unwrap());

    db.storage
        .set_auto_approve("acme", KnowledgeCategory::Tooling, false)
        .await
        .unwrap();
    assert!(!db
        .storage
        .is_auto_approved("acme", KnowledgeCategory::Tooling)
        .await
        .unwrap());
}

#[tokio::test]
async fn api_key_lifecycle() {
    let db = test_storage().await;
    let record = ApiKeyRecord {
        id: Uuid::new_v4(),
        key_prefix: "hm_12345".to_string(),
        key_hash: "a".repeat(64),
        tenant_id: "acme".to_string(),
        agent_id: "agent-1".to_string(),
        tier: Tier::Pro,
        request_count: 0,
        billing_period_start: Utc::now() - Duration::days(10),
        billing_period_reset_days: 30,
        is_active: true,
        last_used_at: None,
    };
    db.storage.insert_api_key(&record).await.unwrap();

    let fetched = db
        .storage
        .find_api_key_by_hash(&record.key_hash)
        .await
        .unwrap()
        .expect("key exists");
    assert_eq!(fetched.tier, Tier::Pro);
    assert_eq!(fetched.tenant_id, "acme");

    db.storage
        .increment_request_count(record.id, Utc::now())
        .await
        .unwrap();
    let used = db
        .storage
        .find_api_key_by_hash(&record.key_hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(used.request_count, 1);
    assert!(used.last_used_at.is_some());

    db.storage
        .reset_billing_period(record.id, Utc::now())
        .await
        .unwrap();
    let reset = db
        .storage
        .find_api_key_by_hash(&record.key_hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reset.request_count, 0);
}

#[tokio::test]
async fn policy_rules_and_role_bindings() {
    let db = test_storage().await;
    let rule = PolicyRule {
        subject: "admin".to_string(),
        domain: "acme".to_string(),
        object: "namespace:acme".to_string(),
        action: "*".to_string(),
    };

    assert!(db.storage.add_policy(&rule).await.unwrap());
    // Idempotent: the second add reports no change
    assert!(!db.storage.add_policy(&rule).await.unwrap());

    let policies = db.storage.policies_for_domain("acme").await.unwrap();
    assert_eq!(policies, vec![rule.clone()]);
    assert!(db.storage.policies_for_domain("globex").await.unwrap().is_empty());

    assert!(db
        .storage
        .add_role_binding("agent-1", "admin", "acme")
        .await
        .unwrap());
    let roles = db.storage.roles_for_subject("agent-1", "acme").await.unwrap();
    assert_eq!(roles, vec!["admin".to_string()]);

    assert!(db.storage.remove_policy(&rule).await.unwrap());
    assert!(!db.storage.remove_policy(&rule).await.unwrap());
}

#[tokio::test]
async fn deployment_config_upsert() {
    let db = test_storage().await;
    assert!(db.storage.get_config("embedding_model_id").await.unwrap().is_none());

    db.storage
        .upsert_config("embedding_model_id", "hivemind/hash-embedder-v1")
        .await
        .unwrap();
    assert_eq!(
        db.storage.get_config("embedding_model_id").await.unwrap().as_deref(),
        Some("hivemind/hash-embedder-v1")
    );

    db.storage
        .upsert_config("embedding_model_id", "hivemind/hash-embedder-v2")
        .await
        .unwrap();
    assert_eq!(
        db.storage.get_config("embedding_model_id").await.unwrap().as_deref(),
        Some("hivemind/hash-embedder-v2")
    );
}

#[tokio::test]
async fn webhook_endpoint_listing_filters_inactive() {
    let db = test_storage().await;
    let active = WebhookEndpoint {
        id: Uuid::new_v4(),
        tenant_id: "acme".to_string(),
        url: "https://example.com/a".to_string(),
        event_types: Some(vec!["knowledge.approved".to_string()]),
        is_active: true,
    };
    let inactive = WebhookEndpoint {
        id: Uuid::new_v4(),
        tenant_id: "acme".to_string(),
        url: "https://example.com/b".to_string(),
        event_types: None,
        is_active: false,
    };
    db.storage.insert_webhook_endpoint(&active).await.unwrap();
    db.storage.insert_webhook_endpoint(&inactive).await.unwrap();

    let endpoints = db.storage.active_webhook_endpoints("acme").await.unwrap();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].url, "https://example.com/a");
}

#[tokio::test]
async fn duplicate_groups_order_by_quality() {
    let db = test_storage().await;
    // Two current rows with the same hash can only coexist across tenants, so
    // seed the group by expiring nothing and bypassing the partial unique
    // index with distinct tenants first, then checking a real group shape
    let mut low = make_item("acme", "agent-1", "Shared duplicate content for merging.");
    low.quality_score = 0.2;
    db.storage.insert_item(&low).await.unwrap();

    // Supersede, then insert a higher-quality duplicate in the same tenant
    db.storage.supersede_item(low.id, "acme", Utc::now()).await.unwrap();
    let mut high = make_item("acme", "agent-1", "Shared duplicate content for merging.");
    high.id = Uuid::new_v4();
    high.quality_score = 0.9;
    db.storage.insert_item(&high).await.unwrap();

    // Only one member is current, so no group forms
    let groups = db.storage.duplicate_groups().await.unwrap();
    assert!(groups.is_empty());
}

#[tokio::test]
async fn list_contributions_merges_pending_and_approved() {
    let db = test_storage().await;
    db.storage
        .insert_pending(&make_pending("acme", "agent-1", "Pending contribution for listing test."))
        .await
        .unwrap();
    db.storage
        .insert_item(&make_item("acme", "agent-1", "Approved contribution for listing test."))
        .await
        .unwrap();
    // Another agent's rows must not appear
    db.storage
        .insert_item(&make_item("acme", "agent-2", "Somebody else's contribution entirely."))
        .await
        .unwrap();

    let (all, total) = db
        .storage
        .list_contributions("acme", "agent-1", "all", None, 20, 0)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].status, "pending");
    assert_eq!(all[1].status, "approved");

    let (pending_only, pending_total) = db
        .storage
        .list_contributions("acme", "agent-1", "pending", None, 20, 0)
        .await
        .unwrap();
    assert_eq!(pending_total, 1);
    assert_eq!(pending_only.len(), 1);

    // Category filter narrows both sets
    let (none, none_total) = db
        .storage
        .list_contributions(
            "acme",
            "agent-1",
            "all",
            Some(KnowledgeCategory::Tooling),
            20,
            0,
        )
        .await
        .unwrap();
    assert_eq!(none_total, 0);
    assert!(none.is_empty());
}

#[tokio::test]
async fn update_resolution_supersedes_and_search_returns_only_the_new_item() {
    use hivemind_core::conflict::{
        apply_conflict_resolution, ConflictAction, ConflictResolution,
    };

    let db = test_storage().await;
    let old = make_item("acme", "agent-1", "Foo bar baz and a little more context.");
    db.storage.insert_item(&old).await.unwrap();

    // Dedup confirmed a duplicate; the resolver classified it as UPDATE
    let resolution = ConflictResolution {
        action: ConflictAction::Update,
        reason: "newer version".to_string(),
        is_direct_conflict: true,
        existing_item_id: old.id,
    };
    let applied = apply_conflict_resolution(&db.storage, &resolution, "acme")
        .await
        .unwrap();
    assert_eq!(applied.applied, ConflictAction::Update);
    assert!(applied.valid_at.is_none());

    let expired = db.storage.get_item_any(old.id).await.unwrap().unwrap();
    assert!(expired.expired_at.is_some(), "system-time supersede recorded");

    // The replacement item enters as the current version
    let new = make_item("acme", "agent-1", "Foo bar baz with the corrected details.");
    db.storage.insert_item(&new).await.unwrap();

    let page = db
        .storage
        .search_knowledge(&search_request("acme", "foo bar baz"))
        .await
        .unwrap();
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].id, new.id, "only the current version surfaces");
}

#[tokio::test]
async fn version_fork_sets_world_time_end() {
    use hivemind_core::conflict::{
        apply_conflict_resolution, ConflictAction, ConflictResolution,
    };

    let db = test_storage().await;
    let old = make_item("acme", "agent-1", "Behavior differs between runtime versions here.");
    db.storage.insert_item(&old).await.unwrap();

    let resolution = ConflictResolution {
        action: ConflictAction::VersionFork,
        reason: "valid for different versions".to_string(),
        is_direct_conflict: true,
        existing_item_id: old.id,
    };
    let applied = apply_conflict_resolution(&db.storage, &resolution, "acme")
        .await
        .unwrap();
    assert_eq!(applied.applied, ConflictAction::VersionFork);
    let fork_at = applied.valid_at.expect("fork carries the new item's valid_at");

    let forked = db.storage.get_item_any(old.id).await.unwrap().unwrap();
    let invalid_at = forked.invalid_at.expect("world-time end recorded");
    assert!((invalid_at - fork_at).num_seconds().abs() < 2);
    assert!(forked.expired_at.is_none(), "system time is untouched by a fork");
}

#[tokio::test]
async fn aggregator_recomputes_scores_incrementally() {
    use hivemind_core::quality::{aggregate_quality_signals, QualityWeights};

    let db = test_storage().await;
    let item = make_item("acme", "agent-1", "Item whose quality evolves from signals.");
    db.storage.insert_item(&item).await.unwrap();

    // Behavioral history: retrieved twice, solved once, contradicted once
    for signal_type in [
        SignalType::Retrieval,
        SignalType::Retrieval,
        SignalType::OutcomeSolved,
        SignalType::Contradiction,
    ] {
        db.storage
            .record_signal(&QualitySignal {
                id: Uuid::new_v4(),
                knowledge_item_id: item.id,
                signal_type,
                agent_id: None,
                run_id: None,
                metadata: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }
    db.storage
        .increment_retrieval_counts(&[item.id, item.id])
        .await
        .unwrap();
    db.storage
        .increment_outcome_counter(item.id, true)
        .await
        .unwrap();

    let report = aggregate_quality_signals(&db.storage, &QualityWeights::default())
        .await
        .unwrap();
    assert_eq!(report.items_updated, 1);

    let scored = db.storage.get_item_any(item.id).await.unwrap().unwrap();
    assert!((0.0..=1.0).contains(&scored.quality_score));
    assert!(
        (scored.quality_score - 0.5).abs() > 1e-6,
        "score must move off the neutral prior"
    );

    // Watermark advanced: a second run with no new signals touches nothing
    assert!(db
        .storage
        .get_config("quality_aggregation_last_run")
        .await
        .unwrap()
        .is_some());
    let second = aggregate_quality_signals(&db.storage, &QualityWeights::default())
        .await
        .unwrap();
    assert_eq!(second.items_updated, 0);
}

#[tokio::test]
async fn distillation_prescreens_low_confidence_pending() {
    use hivemind_core::quality::run_distillation;
    use hivemind_core::{PiiSanitizer, Settings};

    let db = test_storage().await;
    let embedder = Embedder::default();
    let sanitizer = PiiSanitizer::new(0.50);
    let settings = Settings {
        distillation_volume_threshold: 1,
        ..Settings::default()
    };

    let mut weak = make_pending("acme", "agent-1", "Vague unverified claim with no support.");
    weak.confidence = 0.1;
    let strong = make_pending("acme", "agent-1", "Well sourced claim from a confident agent.");
    db.storage.insert_pending(&weak).await.unwrap();
    db.storage.insert_pending(&strong).await.unwrap();

    let report = run_distillation(&db.storage, &settings, &sanitizer, &embedder, None)
        .await
        .unwrap();
    assert_eq!(report.status, "completed");
    assert_eq!(report.items_prescreened, 2);
    assert_eq!(report.low_quality_filtered, 1);

    let flagged = db.storage.get_pending(weak.id, "acme").await.unwrap().unwrap();
    assert!(flagged.is_sensitive_flagged);
    assert_eq!(flagged.tags.as_ref().unwrap()["low_quality_prescreened"], true);

    let untouched = db.storage.get_pending(strong.id, "acme").await.unwrap().unwrap();
    assert!(!untouched.is_sensitive_flagged);

    assert!(db
        .storage
        .get_config("distillation_last_run")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn distillation_short_circuits_below_thresholds() {
    use hivemind_core::quality::run_distillation;
    use hivemind_core::{PiiSanitizer, Settings};

    let db = test_storage().await;
    let report = run_distillation(
        &db.storage,
        &Settings::default(),
        &PiiSanitizer::new(0.50),
        &Embedder::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.status, "skipped");
    assert!(db
        .storage
        .get_config("distillation_last_run")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn current_item_contents_for_lsh_rebuild() {
    let db = test_storage().await;
    let live = make_item("acme", "agent-1", "Live content that belongs in the index.");
    let expired = make_item("acme", "agent-1", "Expired content that must be skipped.");
    db.storage.insert_item(&live).await.unwrap();
    db.storage.insert_item(&expired).await.unwrap();
    db.storage
        .supersede_item(expired.id, "acme", Utc::now())
        .await
        .unwrap();

    let contents = db.storage.current_item_contents().await.unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].0, live.id);
}
