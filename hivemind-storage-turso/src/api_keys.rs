//! API key records: hashed-key lookup, billing window, usage counters

use chrono::{DateTime, Utc};
use hivemind_core::types::{ApiKeyRecord, Tier};
use hivemind_core::{Error, Result};
use libsql::Row;
use tracing::info;
use uuid::Uuid;

use crate::knowledge::next_row;
use crate::{col, opt_ts_from_sql, ts_from_sql, ts_to_sql, uuid_from_sql, TursoStorage};

const API_KEY_COLUMNS: &str = "id, key_prefix, key_hash, tenant_id, agent_id, tier, \
     request_count, billing_period_start, billing_period_reset_days, is_active, last_used_at";

impl TursoStorage {
    /// Persist a new API key record; only the prefix and hash are stored
    pub async fn insert_api_key(&self, record: &ApiKeyRecord) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            r#"
            INSERT INTO api_keys (
                id, key_prefix, key_hash, tenant_id, agent_id, tier,
                request_count, billing_period_start, billing_period_reset_days,
                is_active, last_used_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                record.id.to_string(),
                record.key_prefix.clone(),
                record.key_hash.clone(),
                record.tenant_id.clone(),
                record.agent_id.clone(),
                record.tier.as_str(),
                record.request_count,
                ts_to_sql(record.billing_period_start),
                record.billing_period_reset_days,
                i64::from(record.is_active),
                record.last_used_at.map(ts_to_sql),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to insert API key: {e}")))?;

        info!("created API key {} ({})", record.key_prefix, record.id);
        Ok(())
    }

    /// Look up a key record by the SHA-256 hash of the presented key
    pub async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let conn = self.get_connection()?;
        let sql = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = ?");
        let mut rows = conn
            .query(&sql, libsql::params![key_hash])
            .await
            .map_err(|e| Error::Storage(format!("Failed to query API key: {e}")))?;

        match next_row(&mut rows).await? {
            Some(row) => Ok(Some(row_to_api_key(&row)?)),
            None => Ok(None),
        }
    }

    /// Start a fresh billing window and zero the request counter
    pub async fn reset_billing_period(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "UPDATE api_keys SET request_count = 0, billing_period_start = ? WHERE id = ?",
            libsql::params![ts_to_sql(now), id.to_string()],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to reset billing period: {e}")))?;
        Ok(())
    }

    /// Bump the usage counter and stamp `last_used_at`
    pub async fn increment_request_count(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "UPDATE api_keys SET request_count = request_count + 1, last_used_at = ? WHERE id = ?",
            libsql::params![ts_to_sql(now), id.to_string()],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to increment request count: {e}")))?;
        Ok(())
    }
}

fn row_to_api_key(row: &Row) -> Result<ApiKeyRecord> {
    let id_raw: String = col!(row, 0)?;
    let tier_raw: String = col!(row, 5)?;
    let tier: Tier = tier_raw.parse().map_err(Error::Storage)?;
    let billing_raw: String = col!(row, 7)?;
    let is_active: i64 = col!(row, 9)?;

    Ok(ApiKeyRecord {
        id: uuid_from_sql(&id_raw)?,
        key_prefix: col!(row, 1)?,
        key_hash: col!(row, 2)?,
        tenant_id: col!(row, 3)?,
        agent_id: col!(row, 4)?,
        tier,
        request_count: col!(row, 6)?,
        billing_period_start: ts_from_sql(&billing_raw)?,
        billing_period_reset_days: col!(row, 8)?,
        is_active: is_active != 0,
        last_used_at: opt_ts_from_sql(col!(row, 10)?)?,
    })
}
