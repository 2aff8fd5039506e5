//! Database schema definitions for the knowledge commons
//!
//! Timestamps are RFC 3339 UTC strings with fixed fractional precision, so
//! lexicographic comparison in SQL matches chronological order. Embeddings
//! live in an `F32_BLOB(384)` column with a cosine vector index; full-text
//! search runs over an FTS5 virtual table kept in sync by triggers.

/// SQL to create the knowledge_items table
pub const CREATE_KNOWLEDGE_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS knowledge_items (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0,
    source_agent_id TEXT NOT NULL,
    run_id TEXT,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    category TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.8,
    framework TEXT,
    language TEXT,
    version TEXT,
    tags TEXT,
    embedding F32_BLOB(384),
    quality_score REAL NOT NULL DEFAULT 0.5,
    retrieval_count INTEGER NOT NULL DEFAULT 0,
    helpful_count INTEGER NOT NULL DEFAULT 0,
    not_helpful_count INTEGER NOT NULL DEFAULT 0,
    contributed_at TEXT NOT NULL,
    approved_at TEXT,
    expired_at TEXT,
    valid_at TEXT,
    invalid_at TEXT,
    deleted_at TEXT
)
"#;

/// Intra-tenant dedup: no two CURRENT (non-superseded, non-deleted) items may
/// share a content hash. Expired history rows are exempt so supersede chains
/// can retain every version.
pub const CREATE_KNOWLEDGE_HASH_UNIQUE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_knowledge_items_hash_tenant
ON knowledge_items(content_hash, tenant_id)
WHERE expired_at IS NULL AND deleted_at IS NULL
"#;

/// Composite index for the common search filter: tenant + visibility
pub const CREATE_KNOWLEDGE_TENANT_PUBLIC_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_knowledge_items_tenant_public
ON knowledge_items(tenant_id, is_public)
"#;

/// Partial index over live rows for quality-ranked queries
pub const CREATE_KNOWLEDGE_QUALITY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_knowledge_items_quality
ON knowledge_items(quality_score)
WHERE deleted_at IS NULL
"#;

/// Approximate nearest-neighbour index over embeddings (cosine metric)
pub const CREATE_KNOWLEDGE_VECTOR_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_knowledge_items_embedding
ON knowledge_items(libsql_vector_idx(embedding))
"#;

/// SQL to create the pending_contributions quarantine table
///
/// `claimed_at` implements the review claim discipline: a reviewer fetch
/// stamps it, hiding the row from other reviewers until the claim TTL lapses.
pub const CREATE_PENDING_CONTRIBUTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pending_contributions (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    source_agent_id TEXT NOT NULL,
    run_id TEXT,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    category TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.8,
    framework TEXT,
    language TEXT,
    version TEXT,
    tags TEXT,
    contributed_at TEXT NOT NULL,
    is_sensitive_flagged INTEGER NOT NULL DEFAULT 0,
    claimed_at TEXT
)
"#;

/// Index on tenant for namespace-scoped pending queries
pub const CREATE_PENDING_TENANT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pending_contributions_tenant
ON pending_contributions(tenant_id)
"#;

/// SQL to create the append-only quality_signals table
pub const CREATE_QUALITY_SIGNALS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS quality_signals (
    id TEXT PRIMARY KEY NOT NULL,
    knowledge_item_id TEXT NOT NULL REFERENCES knowledge_items(id) ON DELETE CASCADE,
    signal_type TEXT NOT NULL,
    agent_id TEXT,
    run_id TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL
)
"#;

/// Index for per-item aggregation queries
pub const CREATE_SIGNALS_ITEM_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_quality_signals_item
ON quality_signals(knowledge_item_id)
"#;

/// Composite index for filtered aggregation (item, type)
pub const CREATE_SIGNALS_ITEM_TYPE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_quality_signals_item_type
ON quality_signals(knowledge_item_id, signal_type)
"#;

/// Index for watermark scans by the aggregator
pub const CREATE_SIGNALS_CREATED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_quality_signals_created
ON quality_signals(created_at)
"#;

/// SQL to create the auto_approve_rules table
pub const CREATE_AUTO_APPROVE_RULES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS auto_approve_rules (
    tenant_id TEXT NOT NULL,
    category TEXT NOT NULL,
    is_auto_approve INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (tenant_id, category)
)
"#;

/// SQL to create the api_keys table (hash only; raw keys are never stored)
pub const CREATE_API_KEYS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY NOT NULL,
    key_prefix TEXT NOT NULL,
    key_hash TEXT NOT NULL UNIQUE,
    tenant_id TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    tier TEXT NOT NULL DEFAULT 'free',
    request_count INTEGER NOT NULL DEFAULT 0,
    billing_period_start TEXT NOT NULL,
    billing_period_reset_days INTEGER NOT NULL DEFAULT 30,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_used_at TEXT
)
"#;

/// SQL to create the webhook_endpoints table
pub const CREATE_WEBHOOK_ENDPOINTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS webhook_endpoints (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    url TEXT NOT NULL,
    event_types TEXT,
    is_active INTEGER NOT NULL DEFAULT 1
)
"#;

/// SQL to create the authorization_policies table
///
/// `ptype` is 'p' for policy tuples and 'g' for role bindings (where the
/// object column holds the role and action is unused).
pub const CREATE_AUTHORIZATION_POLICIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS authorization_policies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ptype TEXT NOT NULL,
    subject TEXT NOT NULL,
    domain TEXT NOT NULL,
    object TEXT NOT NULL,
    action TEXT NOT NULL DEFAULT '',
    UNIQUE (ptype, subject, domain, object, action)
)
"#;

/// Index for domain-scoped policy loads
pub const CREATE_POLICIES_DOMAIN_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_authorization_policies_domain
ON authorization_policies(domain)
"#;

/// SQL to create the deployment_config key/value table
pub const CREATE_DEPLOYMENT_CONFIG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS deployment_config (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// FTS5 virtual table mirroring knowledge content for BM25 ranking
///
/// Tokenizer: porter unicode61 for stemming plus Unicode-aware tokenization.
pub const CREATE_KNOWLEDGE_FTS_TABLE: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts USING fts5(
    item_id UNINDEXED,
    content,
    tokenize='porter unicode61'
)
"#;

/// Triggers keeping knowledge_fts in sync with knowledge_items
pub const CREATE_KNOWLEDGE_FTS_TRIGGERS: [&str; 3] = [
    r#"
CREATE TRIGGER IF NOT EXISTS knowledge_items_ai AFTER INSERT ON knowledge_items BEGIN
    INSERT INTO knowledge_fts(item_id, content) VALUES (new.id, new.content);
END
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS knowledge_items_au AFTER UPDATE OF content ON knowledge_items BEGIN
    UPDATE knowledge_fts SET content = new.content WHERE item_id = new.id;
END
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS knowledge_items_ad AFTER DELETE ON knowledge_items BEGIN
    DELETE FROM knowledge_fts WHERE item_id = old.id;
END
"#,
];

/// Every statement needed to bootstrap an empty database, in order
pub fn all_statements() -> Vec<&'static str> {
    let mut statements = vec![
        CREATE_KNOWLEDGE_ITEMS_TABLE,
        CREATE_KNOWLEDGE_HASH_UNIQUE_INDEX,
        CREATE_KNOWLEDGE_TENANT_PUBLIC_INDEX,
        CREATE_KNOWLEDGE_QUALITY_INDEX,
        CREATE_KNOWLEDGE_VECTOR_INDEX,
        CREATE_PENDING_CONTRIBUTIONS_TABLE,
        CREATE_PENDING_TENANT_INDEX,
        CREATE_QUALITY_SIGNALS_TABLE,
        CREATE_SIGNALS_ITEM_INDEX,
        CREATE_SIGNALS_ITEM_TYPE_INDEX,
        CREATE_SIGNALS_CREATED_INDEX,
        CREATE_AUTO_APPROVE_RULES_TABLE,
        CREATE_API_KEYS_TABLE,
        CREATE_WEBHOOK_ENDPOINTS_TABLE,
        CREATE_AUTHORIZATION_POLICIES_TABLE,
        CREATE_POLICIES_DOMAIN_INDEX,
        CREATE_DEPLOYMENT_CONFIG_TABLE,
        CREATE_KNOWLEDGE_FTS_TABLE,
    ];
    statements.extend(CREATE_KNOWLEDGE_FTS_TRIGGERS);
    statements
}
