//! Quality signal log operations
//!
//! The signal table is append-only: rows are inserted and aggregated, never
//! updated. Outcome idempotency is a check-then-insert against
//! (item, run, outcome-type) performed by the caller via
//! [`TursoStorage::find_outcome_signal`].

use chrono::{DateTime, Utc};
use hivemind_core::storage::SignalCounts;
use hivemind_core::types::{KnowledgeCategory, QualitySignal, SignalType};
use hivemind_core::{Error, Result};
use tracing::debug;
use uuid::Uuid;

use crate::knowledge::next_row;
use crate::{col, ts_from_sql, ts_to_sql, uuid_from_sql, TursoStorage};

impl TursoStorage {
    /// Append one behavioral signal
    pub async fn record_signal(&self, signal: &QualitySignal) -> Result<()> {
        let conn = self.get_connection()?;

        let metadata_json = signal
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Error::Serialization)?;

        conn.execute(
            "INSERT INTO quality_signals (id, knowledge_item_id, signal_type, agent_id, run_id, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                signal.id.to_string(),
                signal.knowledge_item_id.to_string(),
                signal.signal_type.as_str(),
                signal.agent_id.clone(),
                signal.run_id.clone(),
                metadata_json,
                ts_to_sql(signal.created_at),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to record signal: {e}")))?;

        debug!(
            "recorded {} signal for item {}",
            signal.signal_type, signal.knowledge_item_id
        );
        Ok(())
    }

    /// Existing outcome signal for (item, run), if any
    pub async fn find_outcome_signal(
        &self,
        item_id: Uuid,
        run_id: &str,
    ) -> Result<Option<Uuid>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT id FROM quality_signals \
                 WHERE knowledge_item_id = ? AND run_id = ? \
                 AND signal_type IN ('outcome_solved', 'outcome_not_helpful')",
                libsql::params![item_id.to_string(), run_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query outcome signal: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => {
                let id_raw: String = col!(row, 0)?;
                Ok(Some(uuid_from_sql(&id_raw)?))
            }
            None => Ok(None),
        }
    }

    /// Distinct item ids with signals newer than the watermark
    pub async fn items_with_signals_since(&self, since: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT DISTINCT knowledge_item_id FROM quality_signals WHERE created_at > ?",
                libsql::params![ts_to_sql(since)],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query affected items: {e}")))?;

        let mut ids = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            let id_raw: String = col!(row, 0)?;
            ids.push(uuid_from_sql(&id_raw)?);
        }
        Ok(ids)
    }

    /// Total and contradiction signal counts for one item
    pub async fn signal_counts(&self, item_id: Uuid) -> Result<SignalCounts> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*), \
                        SUM(CASE WHEN signal_type = 'contradiction' THEN 1 ELSE 0 END) \
                 FROM quality_signals WHERE knowledge_item_id = ?",
                libsql::params![item_id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to count signals: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => {
                let total: i64 = col!(row, 0)?;
                let contradictions: Option<i64> = col!(row, 1)?;
                Ok(SignalCounts {
                    total,
                    contradictions: contradictions.unwrap_or(0),
                })
            }
            None => Ok(SignalCounts::default()),
        }
    }

    /// Timestamp of the latest retrieval signal for one item
    pub async fn last_retrieval_at(&self, item_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT MAX(created_at) FROM quality_signals \
                 WHERE knowledge_item_id = ? AND signal_type = 'retrieval'",
                libsql::params![item_id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query last retrieval: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => {
                let raw: Option<String> = col!(row, 0)?;
                raw.as_deref().map(ts_from_sql).transpose()
            }
            None => Ok(None),
        }
    }

    /// Count of contradiction signals created after the watermark
    pub async fn contradiction_signals_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM quality_signals \
                 WHERE signal_type = 'contradiction' AND created_at > ?",
                libsql::params![ts_to_sql(since)],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to count contradictions: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => col!(row, 0),
            None => Ok(0),
        }
    }

    /// Current items carrying at least one contradiction signal
    pub async fn contradiction_flagged_items(
        &self,
    ) -> Result<Vec<(Uuid, KnowledgeCategory, String)>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT DISTINCT ki.id, ki.category, ki.tenant_id \
                 FROM quality_signals qs \
                 JOIN knowledge_items ki ON ki.id = qs.knowledge_item_id \
                 WHERE qs.signal_type = ? \
                   AND ki.expired_at IS NULL AND ki.deleted_at IS NULL",
                libsql::params![SignalType::Contradiction.as_str()],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query contradiction items: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            let id_raw: String = col!(row, 0)?;
            let category_raw: String = col!(row, 1)?;
            let category: KnowledgeCategory = category_raw.parse().map_err(Error::Storage)?;
            out.push((uuid_from_sql(&id_raw)?, category, col!(row, 2)?));
        }
        Ok(out)
    }
}
