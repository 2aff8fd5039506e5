//! Webhook endpoint registry and commons statistics queries

use hivemind_core::storage::{AgentStats, CommonsStats, TenantStats};
use hivemind_core::types::WebhookEndpoint;
use hivemind_core::{Error, Result};

use crate::knowledge::next_row;
use crate::{col, uuid_from_sql, TursoStorage};

impl TursoStorage {
    /// Register a webhook endpoint
    pub async fn insert_webhook_endpoint(&self, endpoint: &WebhookEndpoint) -> Result<()> {
        let conn = self.get_connection()?;
        let event_types_json = endpoint
            .event_types
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Error::Serialization)?;

        conn.execute(
            "INSERT INTO webhook_endpoints (id, tenant_id, url, event_types, is_active) \
             VALUES (?, ?, ?, ?, ?)",
            libsql::params![
                endpoint.id.to_string(),
                endpoint.tenant_id.clone(),
                endpoint.url.clone(),
                event_types_json,
                i64::from(endpoint.is_active),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to insert webhook endpoint: {e}")))?;
        Ok(())
    }

    /// Active endpoints for a tenant
    pub async fn active_webhook_endpoints(&self, tenant_id: &str) -> Result<Vec<WebhookEndpoint>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT id, tenant_id, url, event_types, is_active FROM webhook_endpoints \
                 WHERE tenant_id = ? AND is_active = 1",
                libsql::params![tenant_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query webhook endpoints: {e}")))?;

        let mut endpoints = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            let id_raw: String = col!(row, 0)?;
            let event_types_raw: Option<String> = col!(row, 3)?;
            let event_types = event_types_raw
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .map_err(Error::Serialization)?;
            let is_active: i64 = col!(row, 4)?;

            endpoints.push(WebhookEndpoint {
                id: uuid_from_sql(&id_raw)?,
                tenant_id: col!(row, 1)?,
                url: col!(row, 2)?,
                event_types,
                is_active: is_active != 0,
            });
        }
        Ok(endpoints)
    }

    /// Commons-wide aggregates
    pub async fn commons_stats(&self) -> Result<CommonsStats> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT \
                   (SELECT COUNT(*) FROM knowledge_items WHERE deleted_at IS NULL), \
                   (SELECT COUNT(*) FROM knowledge_items WHERE deleted_at IS NULL AND is_public = 1), \
                   (SELECT COUNT(*) FROM pending_contributions), \
                   (SELECT COUNT(*) FROM quality_signals)",
                (),
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query commons stats: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => Ok(CommonsStats {
                total_items: col!(row, 0)?,
                public_items: col!(row, 1)?,
                pending_contributions: col!(row, 2)?,
                total_signals: col!(row, 3)?,
            }),
            None => Ok(CommonsStats::default()),
        }
    }

    /// Per-tenant aggregates
    pub async fn tenant_stats(&self, tenant_id: &str) -> Result<TenantStats> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT \
                   (SELECT COUNT(*) FROM knowledge_items WHERE tenant_id = ?1 AND deleted_at IS NULL), \
                   (SELECT COUNT(*) FROM knowledge_items WHERE tenant_id = ?1 AND deleted_at IS NULL AND is_public = 1), \
                   (SELECT COUNT(*) FROM pending_contributions WHERE tenant_id = ?1), \
                   (SELECT AVG(quality_score) FROM knowledge_items WHERE tenant_id = ?1 AND deleted_at IS NULL)",
                libsql::params![tenant_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query tenant stats: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => {
                let avg: Option<f64> = col!(row, 3)?;
                Ok(TenantStats {
                    tenant_id: tenant_id.to_string(),
                    total_items: col!(row, 0)?,
                    public_items: col!(row, 1)?,
                    pending_contributions: col!(row, 2)?,
                    avg_quality_score: avg.unwrap_or(0.0),
                })
            }
            None => Ok(TenantStats {
                tenant_id: tenant_id.to_string(),
                ..TenantStats::default()
            }),
        }
    }

    /// Per-agent aggregates within a tenant
    pub async fn agent_stats(&self, tenant_id: &str, agent_id: &str) -> Result<AgentStats> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*), \
                        COALESCE(SUM(helpful_count), 0), \
                        COALESCE(SUM(not_helpful_count), 0) \
                 FROM knowledge_items \
                 WHERE tenant_id = ? AND source_agent_id = ? AND deleted_at IS NULL",
                libsql::params![tenant_id, agent_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query agent stats: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => Ok(AgentStats {
                tenant_id: tenant_id.to_string(),
                agent_id: agent_id.to_string(),
                contributed_items: col!(row, 0)?,
                helpful_count: col!(row, 1)?,
                not_helpful_count: col!(row, 2)?,
            }),
            None => Ok(AgentStats {
                tenant_id: tenant_id.to_string(),
                agent_id: agent_id.to_string(),
                ..AgentStats::default()
            }),
        }
    }
}
