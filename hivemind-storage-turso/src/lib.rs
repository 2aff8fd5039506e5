//! # HiveMind Storage - Turso
//!
//! Turso/libSQL storage backend for the knowledge commons.
//!
//! This crate provides:
//! - Connection management for local and remote libSQL databases
//! - Schema creation (bi-temporal knowledge table, FTS5 mirror, vector index)
//! - The [`hivemind_core::KnowledgeStore`] implementation, including the
//!   single-statement hybrid BM25+vector RRF search
//! - The pending-review queue with claim discipline
//!
//! ## Example
//!
//! ```no_run
//! use hivemind_storage_turso::TursoStorage;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = TursoStorage::open_local("hivemind.db").await?;
//! storage.initialize_schema().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use hivemind_core::{Error, Result};
use libsql::{Builder, Connection, Database};
use tracing::{debug, info};

/// Read a typed column from a libsql row, wrapping errors uniformly
macro_rules! col {
    ($row:expr, $idx:expr) => {
        $row.get($idx).map_err(|e| {
            hivemind_core::Error::Storage(format!("Failed to read column {}: {e}", $idx))
        })
    };
}
pub(crate) use col;

mod api_keys;
mod config_store;
mod knowledge;
mod pending;
mod policies;
mod schema;
mod search;
mod signals;
mod trait_impl;
mod webhook_endpoints;

#[cfg(test)]
mod tests;

pub use search::{decode_cursor, encode_cursor};

/// Turso storage backend for the knowledge commons
pub struct TursoStorage {
    db: Arc<Database>,
}

impl TursoStorage {
    /// Open a remote Turso database
    ///
    /// # Arguments
    ///
    /// * `url` - `libsql://` database URL
    /// * `token` - Authentication token
    pub async fn new(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await
            .map_err(|e| Error::Storage(format!("Failed to connect to Turso: {e}")))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open (or create) a local database file
    pub async fn open_local(path: &str) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| Error::Storage(format!("Failed to open local database: {e}")))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Wrap an existing libSQL database (handy for tests)
    pub fn from_database(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    /// Get a connection from the database
    pub(crate) fn get_connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| Error::Storage(format!("Failed to get connection: {e}")))
    }

    /// Create all tables, indexes, and FTS triggers (idempotent)
    pub async fn initialize_schema(&self) -> Result<()> {
        let conn = self.get_connection()?;
        for statement in schema::all_statements() {
            conn.execute(statement, ())
                .await
                .map_err(|e| Error::Storage(format!("Schema statement failed: {e}")))?;
            debug!("schema statement applied");
        }
        info!("storage schema initialized");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Column conversion helpers shared by the storage modules
// ---------------------------------------------------------------------------

/// Serialize a timestamp to the fixed-precision RFC 3339 form stored in SQL
///
/// Microsecond precision with a `Z` suffix keeps the strings a constant width
/// so lexicographic SQL comparison equals chronological order.
pub(crate) fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 timestamp
pub(crate) fn ts_from_sql(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Invalid stored timestamp '{raw}': {e}")))
}

/// Read an optional timestamp column
pub(crate) fn opt_ts_from_sql(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(ts_from_sql).transpose()
}

/// Parse a stored UUID column
pub(crate) fn uuid_from_sql(raw: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw)
        .map_err(|e| Error::Storage(format!("Invalid stored UUID '{raw}': {e}")))
}

/// Serialize an embedding for a `vector32(?)` SQL parameter
pub(crate) fn embedding_to_sql(embedding: &[f32]) -> Result<String> {
    serde_json::to_string(embedding).map_err(Error::Serialization)
}

/// Decode an `F32_BLOB` column back into an embedding vector
pub(crate) fn embedding_from_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod conversion_tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_and_sort() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(1500);

        let a = ts_to_sql(earlier);
        let b = ts_to_sql(later);
        assert!(a < b, "lexicographic order must match chronological order");
        assert_eq!(ts_from_sql(&a).unwrap(), earlier);
    }

    #[test]
    fn embedding_blob_round_trip() {
        let original = vec![0.25f32, -1.5, 3.125];
        let blob: Vec<u8> = original.iter().flat_map(|f| f.to_le_bytes()).collect();
        assert_eq!(embedding_from_blob(&blob), original);
    }
}
