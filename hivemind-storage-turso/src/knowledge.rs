//! Knowledge item CRUD and lifecycle operations

use chrono::{DateTime, Utc};
use hivemind_core::types::{KnowledgeCategory, KnowledgeItem};
use hivemind_core::{Error, Result};
use libsql::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    col, embedding_from_blob, embedding_to_sql, opt_ts_from_sql, ts_to_sql, uuid_from_sql,
    TursoStorage,
};

/// Column list shared by every knowledge item SELECT
pub(crate) const ITEM_COLUMNS: &str = "id, tenant_id, is_public, source_agent_id, run_id, \
     content, content_hash, category, confidence, framework, language, version, tags, \
     embedding, quality_score, retrieval_count, helpful_count, not_helpful_count, \
     contributed_at, approved_at, expired_at, valid_at, invalid_at, deleted_at";

impl TursoStorage {
    /// Insert an approved knowledge item
    pub async fn insert_item(&self, item: &KnowledgeItem) -> Result<()> {
        debug!("storing knowledge item: {}", item.id);
        let conn = self.get_connection()?;

        let tags_json = item
            .tags
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Error::Serialization)?;

        // Two statement shapes: vector32() rejects NULL, so embedding-less
        // rows take the plain-NULL path
        if let Some(embedding) = &item.embedding {
            let sql = r#"
                INSERT INTO knowledge_items (
                    id, tenant_id, is_public, source_agent_id, run_id,
                    content, content_hash, category, confidence, framework,
                    language, version, tags, embedding, quality_score,
                    retrieval_count, helpful_count, not_helpful_count,
                    contributed_at, approved_at, expired_at, valid_at, invalid_at, deleted_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, vector32(?), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#;
            conn.execute(
                sql,
                libsql::params![
                    item.id.to_string(),
                    item.tenant_id.clone(),
                    i64::from(item.is_public),
                    item.source_agent_id.clone(),
                    item.run_id.clone(),
                    item.content.clone(),
                    item.content_hash.clone(),
                    item.category.as_str(),
                    f64::from(item.confidence),
                    item.framework.clone(),
                    item.language.clone(),
                    item.version.clone(),
                    tags_json,
                    embedding_to_sql(embedding)?,
                    f64::from(item.quality_score),
                    item.retrieval_count,
                    item.helpful_count,
                    item.not_helpful_count,
                    ts_to_sql(item.contributed_at),
                    item.approved_at.map(ts_to_sql),
                    item.expired_at.map(ts_to_sql),
                    item.valid_at.map(ts_to_sql),
                    item.invalid_at.map(ts_to_sql),
                    item.deleted_at.map(ts_to_sql),
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to store knowledge item: {e}")))?;
        } else {
            let sql = r#"
                INSERT INTO knowledge_items (
                    id, tenant_id, is_public, source_agent_id, run_id,
                    content, content_hash, category, confidence, framework,
                    language, version, tags, embedding, quality_score,
                    retrieval_count, helpful_count, not_helpful_count,
                    contributed_at, approved_at, expired_at, valid_at, invalid_at, deleted_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#;
            conn.execute(
                sql,
                libsql::params![
                    item.id.to_string(),
                    item.tenant_id.clone(),
                    i64::from(item.is_public),
                    item.source_agent_id.clone(),
                    item.run_id.clone(),
                    item.content.clone(),
                    item.content_hash.clone(),
                    item.category.as_str(),
                    f64::from(item.confidence),
                    item.framework.clone(),
                    item.language.clone(),
                    item.version.clone(),
                    tags_json,
                    f64::from(item.quality_score),
                    item.retrieval_count,
                    item.helpful_count,
                    item.not_helpful_count,
                    ts_to_sql(item.contributed_at),
                    item.approved_at.map(ts_to_sql),
                    item.expired_at.map(ts_to_sql),
                    item.valid_at.map(ts_to_sql),
                    item.invalid_at.map(ts_to_sql),
                    item.deleted_at.map(ts_to_sql),
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to store knowledge item: {e}")))?;
        }

        info!("stored knowledge item: {}", item.id);
        Ok(())
    }

    /// Fetch one item scoped to the caller's tenant plus the public commons
    ///
    /// Cross-tenant private rows are indistinguishable from missing rows.
    pub async fn get_item(&self, id: Uuid, tenant_id: &str) -> Result<Option<KnowledgeItem>> {
        let conn = self.get_connection()?;
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM knowledge_items \
             WHERE id = ? AND (tenant_id = ? OR is_public = 1) AND deleted_at IS NULL"
        );

        let mut rows = conn
            .query(&sql, libsql::params![id.to_string(), tenant_id])
            .await
            .map_err(|e| Error::Storage(format!("Failed to query knowledge item: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => Ok(Some(row_to_item(&row)?)),
            None => Ok(None),
        }
    }

    /// Fetch one item with no tenant scoping (background jobs only)
    pub async fn get_item_any(&self, id: Uuid) -> Result<Option<KnowledgeItem>> {
        let conn = self.get_connection()?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM knowledge_items WHERE id = ?");

        let mut rows = conn
            .query(&sql, libsql::params![id.to_string()])
            .await
            .map_err(|e| Error::Storage(format!("Failed to query knowledge item: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => Ok(Some(row_to_item(&row)?)),
            None => Ok(None),
        }
    }

    /// Soft-delete: stamp `deleted_at` without dropping the row
    ///
    /// Only the creating agent within its own tenant matches; anything else
    /// leaves the table untouched and returns false.
    pub async fn soft_delete_item(
        &self,
        id: Uuid,
        tenant_id: &str,
        agent_id: &str,
    ) -> Result<bool> {
        let conn = self.get_connection()?;
        let affected = conn
            .execute(
                "UPDATE knowledge_items SET deleted_at = ? \
                 WHERE id = ? AND tenant_id = ? AND source_agent_id = ? AND deleted_at IS NULL",
                libsql::params![ts_to_sql(Utc::now()), id.to_string(), tenant_id, agent_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to soft-delete item: {e}")))?;

        if affected > 0 {
            info!("soft-deleted knowledge item: {id}");
        }
        Ok(affected > 0)
    }

    /// System-time supersede: stamp `expired_at`; the row is retained
    pub async fn supersede_item(
        &self,
        id: Uuid,
        tenant_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "UPDATE knowledge_items SET expired_at = ? WHERE id = ? AND tenant_id = ?",
            libsql::params![ts_to_sql(at), id.to_string(), tenant_id],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to supersede item: {e}")))?;
        Ok(())
    }

    /// World-time end: stamp `invalid_at`
    pub async fn invalidate_item(
        &self,
        id: Uuid,
        tenant_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "UPDATE knowledge_items SET invalid_at = ? WHERE id = ? AND tenant_id = ?",
            libsql::params![ts_to_sql(at), id.to_string(), tenant_id],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to invalidate item: {e}")))?;
        Ok(())
    }

    /// Toggle public visibility; creating agent only, reversible
    pub async fn set_item_public(
        &self,
        id: Uuid,
        tenant_id: &str,
        agent_id: &str,
        is_public: bool,
    ) -> Result<bool> {
        let conn = self.get_connection()?;
        let affected = conn
            .execute(
                "UPDATE knowledge_items SET is_public = ? \
                 WHERE id = ? AND tenant_id = ? AND source_agent_id = ? AND deleted_at IS NULL",
                libsql::params![
                    i64::from(is_public),
                    id.to_string(),
                    tenant_id,
                    agent_id
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to set item visibility: {e}")))?;
        Ok(affected > 0)
    }

    /// Atomically bump `retrieval_count` for all ids in one statement
    pub async fn increment_retrieval_counts(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.get_connection()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE knowledge_items SET retrieval_count = retrieval_count + 1 \
             WHERE id IN ({placeholders})"
        );
        let params: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        conn.execute(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| Error::Storage(format!("Failed to increment retrieval counts: {e}")))?;
        Ok(())
    }

    /// Atomically bump the helpful / not-helpful counter
    pub async fn increment_outcome_counter(&self, id: Uuid, helpful: bool) -> Result<()> {
        let conn = self.get_connection()?;
        let sql = if helpful {
            "UPDATE knowledge_items SET helpful_count = helpful_count + 1 WHERE id = ?"
        } else {
            "UPDATE knowledge_items SET not_helpful_count = not_helpful_count + 1 WHERE id = ?"
        };
        conn.execute(sql, libsql::params![id.to_string()])
            .await
            .map_err(|e| Error::Storage(format!("Failed to increment outcome counter: {e}")))?;
        Ok(())
    }

    /// Write back an aggregated quality score
    pub async fn update_quality_score(&self, id: Uuid, score: f32) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "UPDATE knowledge_items SET quality_score = ? WHERE id = ?",
            libsql::params![f64::from(score), id.to_string()],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to update quality score: {e}")))?;
        Ok(())
    }

    /// Replace an item's tags payload
    pub async fn update_item_tags(&self, id: Uuid, tags: &serde_json::Value) -> Result<()> {
        let conn = self.get_connection()?;
        let tags_json = serde_json::to_string(tags).map_err(Error::Serialization)?;
        conn.execute(
            "UPDATE knowledge_items SET tags = ? WHERE id = ?",
            libsql::params![tags_json, id.to_string()],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to update item tags: {e}")))?;
        Ok(())
    }

    /// Current duplicate groups by (content_hash, tenant), members ordered by
    /// quality descending
    pub async fn duplicate_groups(
        &self,
    ) -> Result<Vec<hivemind_core::storage::DuplicateGroup>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT content_hash, tenant_id, id, quality_score FROM knowledge_items \
                 WHERE expired_at IS NULL AND deleted_at IS NULL \
                 ORDER BY content_hash, tenant_id, quality_score DESC",
                (),
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to scan duplicate groups: {e}")))?;

        let mut groups: Vec<hivemind_core::storage::DuplicateGroup> = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            let content_hash: String = col!(row, 0)?;
            let tenant_id: String = col!(row, 1)?;
            let id_raw: String = col!(row, 2)?;
            let id = uuid_from_sql(&id_raw)?;

            match groups.last_mut() {
                Some(group) if group.content_hash == content_hash && group.tenant_id == tenant_id => {
                    group.ids.push(id);
                }
                _ => groups.push(hivemind_core::storage::DuplicateGroup {
                    content_hash,
                    tenant_id,
                    ids: vec![id],
                }),
            }
        }

        groups.retain(|g| g.ids.len() > 1);
        Ok(groups)
    }

    /// Current items with embeddings, projected for distillation clustering
    pub async fn clusterable_items(
        &self,
    ) -> Result<Vec<hivemind_core::storage::ClusterableItem>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT id, tenant_id, category, content, embedding FROM knowledge_items \
                 WHERE expired_at IS NULL AND deleted_at IS NULL AND embedding IS NOT NULL",
                (),
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to scan clusterable items: {e}")))?;

        let mut items = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            let id_raw: String = col!(row, 0)?;
            let category_raw: String = col!(row, 2)?;
            let category: KnowledgeCategory = category_raw.parse().map_err(Error::Storage)?;
            let blob: Vec<u8> = col!(row, 4)?;
            items.push(hivemind_core::storage::ClusterableItem {
                id: uuid_from_sql(&id_raw)?,
                tenant_id: col!(row, 1)?,
                category,
                content: col!(row, 3)?,
                embedding: embedding_from_blob(&blob),
            });
        }
        Ok(items)
    }

    /// (id, content) of every current item, for rebuilding the LSH index
    pub async fn current_item_contents(&self) -> Result<Vec<(Uuid, String)>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT id, content FROM knowledge_items \
                 WHERE expired_at IS NULL AND deleted_at IS NULL",
                (),
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to scan item contents: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            let id_raw: String = col!(row, 0)?;
            out.push((uuid_from_sql(&id_raw)?, col!(row, 1)?));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

/// Advance a result cursor, wrapping libsql errors
pub(crate) async fn next_row(rows: &mut libsql::Rows) -> Result<Option<Row>> {
    rows.next()
        .await
        .map_err(|e| Error::Storage(format!("Failed to fetch row: {e}")))
}

/// Map a full knowledge item row (ITEM_COLUMNS order)
pub(crate) fn row_to_item(row: &Row) -> Result<KnowledgeItem> {
    let id_raw: String = col!(row, 0)?;
    let category_raw: String = col!(row, 7)?;
    let category: KnowledgeCategory = category_raw.parse().map_err(Error::Storage)?;

    let tags_raw: Option<String> = col!(row, 12)?;
    let tags = tags_raw
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(Error::Serialization)?;

    let embedding_raw: Option<Vec<u8>> = col!(row, 13)?;
    let embedding = embedding_raw.map(|blob| embedding_from_blob(&blob));

    let confidence: f64 = col!(row, 8)?;
    let quality_score: f64 = col!(row, 14)?;
    let is_public: i64 = col!(row, 2)?;
    let contributed_raw: String = col!(row, 18)?;

    Ok(KnowledgeItem {
        id: uuid_from_sql(&id_raw)?,
        tenant_id: col!(row, 1)?,
        is_public: is_public != 0,
        source_agent_id: col!(row, 3)?,
        run_id: col!(row, 4)?,
        content: col!(row, 5)?,
        content_hash: col!(row, 6)?,
        category,
        confidence: confidence as f32,
        framework: col!(row, 9)?,
        language: col!(row, 10)?,
        version: col!(row, 11)?,
        tags,
        embedding,
        quality_score: quality_score as f32,
        retrieval_count: col!(row, 15)?,
        helpful_count: col!(row, 16)?,
        not_helpful_count: col!(row, 17)?,
        contributed_at: crate::ts_from_sql(&contributed_raw)?,
        approved_at: opt_ts_from_sql(col!(row, 19)?)?,
        expired_at: opt_ts_from_sql(col!(row, 20)?)?,
        valid_at: opt_ts_from_sql(col!(row, 21)?)?,
        invalid_at: opt_ts_from_sql(col!(row, 22)?)?,
        deleted_at: opt_ts_from_sql(col!(row, 23)?)?,
    })
}
