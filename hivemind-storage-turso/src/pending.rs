//! Pending contribution queue operations
//!
//! Quarantined contributions wait here for operator review. The review fetch
//! uses a claim discipline: claiming stamps `claimed_at` in a single UPDATE,
//! hiding the rows from other reviewers until the claim TTL lapses. Released
//! (stale) claims rejoin the queue automatically.

use chrono::{Duration, Utc};
use hivemind_core::storage::ContributionListing;
use hivemind_core::types::{KnowledgeCategory, PendingContribution};
use hivemind_core::{Error, Result};
use libsql::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::knowledge::next_row;
use crate::{col, ts_from_sql, ts_to_sql, uuid_from_sql, TursoStorage};

const PENDING_COLUMNS: &str = "id, tenant_id, source_agent_id, run_id, content, content_hash, \
     category, confidence, framework, language, version, tags, contributed_at, \
     is_sensitive_flagged";

impl TursoStorage {
    /// Insert a quarantined contribution
    pub async fn insert_pending(&self, contribution: &PendingContribution) -> Result<()> {
        debug!("queueing pending contribution: {}", contribution.id);
        let conn = self.get_connection()?;

        let tags_json = contribution
            .tags
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Error::Serialization)?;

        conn.execute(
            r#"
            INSERT INTO pending_contributions (
                id, tenant_id, source_agent_id, run_id, content, content_hash,
                category, confidence, framework, language, version, tags,
                contributed_at, is_sensitive_flagged
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                contribution.id.to_string(),
                contribution.tenant_id.clone(),
                contribution.source_agent_id.clone(),
                contribution.run_id.clone(),
                contribution.content.clone(),
                contribution.content_hash.clone(),
                contribution.category.as_str(),
                f64::from(contribution.confidence),
                contribution.framework.clone(),
                contribution.language.clone(),
                contribution.version.clone(),
                tags_json,
                ts_to_sql(contribution.contributed_at),
                i64::from(contribution.is_sensitive_flagged),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to insert pending contribution: {e}")))?;

        info!("queued pending contribution: {}", contribution.id);
        Ok(())
    }

    /// Fetch one pending contribution within a tenant
    pub async fn get_pending(
        &self,
        id: Uuid,
        tenant_id: &str,
    ) -> Result<Option<PendingContribution>> {
        let conn = self.get_connection()?;
        let sql = format!(
            "SELECT {PENDING_COLUMNS} FROM pending_contributions WHERE id = ? AND tenant_id = ?"
        );
        let mut rows = conn
            .query(&sql, libsql::params![id.to_string(), tenant_id])
            .await
            .map_err(|e| Error::Storage(format!("Failed to query pending contribution: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => Ok(Some(row_to_pending(&row)?)),
            None => Ok(None),
        }
    }

    /// Claim up to `limit` unclaimed pending rows of a tenant for review
    ///
    /// A single UPDATE ... RETURNING stamps the claim and returns the rows
    /// atomically, so two concurrent reviewers never receive the same row.
    pub async fn claim_pending_for_review(
        &self,
        tenant_id: &str,
        limit: usize,
        claim_ttl_secs: u64,
    ) -> Result<Vec<PendingContribution>> {
        let conn = self.get_connection()?;
        let now = Utc::now();
        let stale_horizon = now - Duration::seconds(claim_ttl_secs as i64);

        let sql = format!(
            "UPDATE pending_contributions SET claimed_at = ? \
             WHERE id IN ( \
                 SELECT id FROM pending_contributions \
                 WHERE tenant_id = ? AND (claimed_at IS NULL OR claimed_at < ?) \
                 ORDER BY contributed_at ASC \
                 LIMIT ? \
             ) \
             RETURNING {PENDING_COLUMNS}"
        );

        let mut rows = conn
            .query(
                &sql,
                libsql::params![
                    ts_to_sql(now),
                    tenant_id,
                    ts_to_sql(stale_horizon),
                    limit as i64
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to claim pending rows: {e}")))?;

        let mut claimed = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            claimed.push(row_to_pending(&row)?);
        }
        debug!("claimed {} pending rows for review", claimed.len());
        Ok(claimed)
    }

    /// Remove a pending row after promotion or rejection
    pub async fn delete_pending(&self, id: Uuid) -> Result<bool> {
        let conn = self.get_connection()?;
        let affected = conn
            .execute(
                "DELETE FROM pending_contributions WHERE id = ?",
                libsql::params![id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete pending contribution: {e}")))?;
        Ok(affected > 0)
    }

    /// Total pending rows
    pub async fn count_pending(&self) -> Result<i64> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM pending_contributions", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to count pending: {e}")))?;
        match next_row(&mut rows).await? {
            Some(row) => col!(row, 0),
            None => Ok(0),
        }
    }

    /// Pending rows not yet flagged sensitive (distillation pre-screen)
    pub async fn unflagged_pending(&self) -> Result<Vec<PendingContribution>> {
        let conn = self.get_connection()?;
        let sql = format!(
            "SELECT {PENDING_COLUMNS} FROM pending_contributions WHERE is_sensitive_flagged = 0"
        );
        let mut rows = conn
            .query(&sql, ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to query unflagged pending: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            out.push(row_to_pending(&row)?);
        }
        Ok(out)
    }

    /// Flag a pending row sensitive and replace its tags
    pub async fn flag_pending_sensitive(
        &self,
        id: Uuid,
        tags: &serde_json::Value,
    ) -> Result<()> {
        let conn = self.get_connection()?;
        let tags_json = serde_json::to_string(tags).map_err(Error::Serialization)?;
        conn.execute(
            "UPDATE pending_contributions SET is_sensitive_flagged = 1, tags = ? WHERE id = ?",
            libsql::params![tags_json, id.to_string()],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to flag pending contribution: {e}")))?;
        Ok(())
    }

    /// The caller's own contributions merged across pending + approved
    ///
    /// Pending entries list first (newest first), then approved items, and
    /// the merged sequence is paginated. `status` is one of `pending`,
    /// `approved`, `all`; `category` optionally narrows both sets.
    pub async fn list_contributions(
        &self,
        tenant_id: &str,
        agent_id: &str,
        status: &str,
        category: Option<KnowledgeCategory>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<ContributionListing>, i64)> {
        let conn = self.get_connection()?;
        let fetch_depth = (offset + limit) as i64;
        let mut merged: Vec<ContributionListing> = Vec::new();
        let mut total: i64 = 0;

        // The optional category narrows both tables; a no-op filter keeps the
        // statements static
        let category_value = category.map_or_else(|| "%".to_string(), |c| c.as_str().to_string());
        let category_clause = if category.is_some() {
            "AND category = ?"
        } else {
            "AND category LIKE ?"
        };

        if status == "pending" || status == "all" {
            let sql = format!(
                "SELECT id, category, content, contributed_at FROM pending_contributions \
                 WHERE tenant_id = ? AND source_agent_id = ? {category_clause} \
                 ORDER BY contributed_at DESC LIMIT ?"
            );
            let mut rows = conn
                .query(
                    &sql,
                    libsql::params![tenant_id, agent_id, category_value.clone(), fetch_depth],
                )
                .await
                .map_err(|e| Error::Storage(format!("Failed to list pending: {e}")))?;
            while let Some(row) = next_row(&mut rows).await? {
                merged.push(listing_from_row(&row, "pending", None)?);
            }

            let count_sql = format!(
                "SELECT COUNT(*) FROM pending_contributions \
                 WHERE tenant_id = ? AND source_agent_id = ? {category_clause}"
            );
            let mut count_rows = conn
                .query(
                    &count_sql,
                    libsql::params![tenant_id, agent_id, category_value.clone()],
                )
                .await
                .map_err(|e| Error::Storage(format!("Failed to count pending: {e}")))?;
            if let Some(row) = next_row(&mut count_rows).await? {
                let n: i64 = col!(row, 0)?;
                total += n;
            }
        }

        if status == "approved" || status == "all" {
            let sql = format!(
                "SELECT id, category, content, contributed_at, is_public FROM knowledge_items \
                 WHERE tenant_id = ? AND source_agent_id = ? AND deleted_at IS NULL {category_clause} \
                 ORDER BY contributed_at DESC LIMIT ?"
            );
            let mut rows = conn
                .query(
                    &sql,
                    libsql::params![tenant_id, agent_id, category_value.clone(), fetch_depth],
                )
                .await
                .map_err(|e| Error::Storage(format!("Failed to list approved: {e}")))?;
            while let Some(row) = next_row(&mut rows).await? {
                let is_public: i64 = col!(row, 4)?;
                merged.push(listing_from_row(&row, "approved", Some(is_public != 0))?);
            }

            let count_sql = format!(
                "SELECT COUNT(*) FROM knowledge_items \
                 WHERE tenant_id = ? AND source_agent_id = ? AND deleted_at IS NULL {category_clause}"
            );
            let mut count_rows = conn
                .query(
                    &count_sql,
                    libsql::params![tenant_id, agent_id, category_value],
                )
                .await
                .map_err(|e| Error::Storage(format!("Failed to count approved: {e}")))?;
            if let Some(row) = next_row(&mut count_rows).await? {
                let n: i64 = col!(row, 0)?;
                total += n;
            }
        }

        let page = merged
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect::<Vec<_>>();
        Ok((page, total))
    }
}

fn listing_from_row(
    row: &Row,
    status: &str,
    is_public: Option<bool>,
) -> Result<ContributionListing> {
    let id_raw: String = col!(row, 0)?;
    let category_raw: String = col!(row, 1)?;
    let content: String = col!(row, 2)?;
    let contributed_raw: String = col!(row, 3)?;

    let category: KnowledgeCategory = category_raw.parse().map_err(Error::Storage)?;
    let title = {
        let truncated: String = content.chars().take(80).collect();
        if content.chars().count() > 80 {
            format!("{truncated}...")
        } else {
            truncated
        }
    };

    Ok(ContributionListing {
        id: uuid_from_sql(&id_raw)?,
        status: status.to_string(),
        category,
        title,
        contributed_at: ts_from_sql(&contributed_raw)?,
        is_public,
    })
}

fn row_to_pending(row: &Row) -> Result<PendingContribution> {
    let id_raw: String = col!(row, 0)?;
    let category_raw: String = col!(row, 6)?;
    let category: KnowledgeCategory = category_raw.parse().map_err(Error::Storage)?;

    let tags_raw: Option<String> = col!(row, 11)?;
    let tags = tags_raw
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(Error::Serialization)?;

    let confidence: f64 = col!(row, 7)?;
    let contributed_raw: String = col!(row, 12)?;
    let flagged: i64 = col!(row, 13)?;

    Ok(PendingContribution {
        id: uuid_from_sql(&id_raw)?,
        tenant_id: col!(row, 1)?,
        source_agent_id: col!(row, 2)?,
        run_id: col!(row, 3)?,
        content: col!(row, 4)?,
        content_hash: col!(row, 5)?,
        category,
        confidence: confidence as f32,
        framework: col!(row, 8)?,
        language: col!(row, 9)?,
        version: col!(row, 10)?,
        tags,
        contributed_at: ts_from_sql(&contributed_raw)?,
        is_sensitive_flagged: flagged != 0,
    })
}
