//! Deployment config key/value store
//!
//! Holds process-wide deployment state: the pinned embedding model identity
//! and the background jobs' last-run watermarks.

use chrono::Utc;
use hivemind_core::{Error, Result};

use crate::knowledge::next_row;
use crate::{col, ts_to_sql, TursoStorage};

impl TursoStorage {
    /// Read a deployment-config value
    pub async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT value FROM deployment_config WHERE key = ?",
                libsql::params![key],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to read config: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => Ok(Some(col!(row, 0)?)),
            None => Ok(None),
        }
    }

    /// Insert or update a deployment-config value
    pub async fn upsert_config(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.get_connection()?;
        let now = ts_to_sql(Utc::now());
        conn.execute(
            "INSERT INTO deployment_config (key, value, created_at, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            libsql::params![key, value, now.clone(), now],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to upsert config: {e}")))?;
        Ok(())
    }

    /// Upsert an auto-approve rule
    pub async fn set_auto_approve(
        &self,
        tenant_id: &str,
        category: hivemind_core::types::KnowledgeCategory,
        enabled: bool,
    ) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO auto_approve_rules (tenant_id, category, is_auto_approve) \
             VALUES (?, ?, ?) \
             ON CONFLICT(tenant_id, category) DO UPDATE SET is_auto_approve = excluded.is_auto_approve",
            libsql::params![tenant_id, category.as_str(), i64::from(enabled)],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to set auto-approve rule: {e}")))?;
        Ok(())
    }

    /// True when the tenant auto-approves this category
    pub async fn is_auto_approved(
        &self,
        tenant_id: &str,
        category: hivemind_core::types::KnowledgeCategory,
    ) -> Result<bool> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT is_auto_approve FROM auto_approve_rules \
                 WHERE tenant_id = ? AND category = ?",
                libsql::params![tenant_id, category.as_str()],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to read auto-approve rule: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => {
                let enabled: i64 = col!(row, 0)?;
                Ok(enabled != 0)
            }
            None => Ok(false),
        }
    }
}
