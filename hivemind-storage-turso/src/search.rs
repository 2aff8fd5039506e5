//! Hybrid retrieval: vector + FTS5 fused by Reciprocal Rank Fusion
//!
//! The whole ranking runs in ONE SQL statement so the search path suspends
//! exactly once:
//!
//!   CTE `vector_results` — top 20 by `vector_distance_cos` over rows passing
//!                          the tenant/visibility/temporal predicate
//!   CTE `text_results`   — top 20 by FTS5 `bm25` over the same predicate
//!   RRF fusion           — `SUM(1.0 / (60 + rank))` per item across both CTEs
//!   Quality boost        — `rrf_score * (0.7 + 0.3 * quality_score)`
//!
//! Post-fetch, results are deduplicated by content hash keeping the first
//! occurrence; tenant-private rows outrank public copies under the scoped
//! predicate, so attribution favors the caller's own namespace.

use std::collections::HashSet;

use hivemind_core::storage::{SearchRequest, SimilarItem};
use hivemind_core::types::{KnowledgeCategory, KnowledgeSummary, SearchPage};
use hivemind_core::{Error, Result};
use libsql::Value;
use tracing::debug;

use crate::knowledge::next_row;
use crate::{col, embedding_to_sql, ts_to_sql, uuid_from_sql, TursoStorage};

/// Per-tier candidate depth before fusion
const CANDIDATE_DEPTH: usize = 20;

/// RRF rank-smoothing constant
const RRF_K: i64 = 60;

/// Quoted-token FTS5 MATCH expression for a free-text query
///
/// Tokens are alphanumeric-filtered and quoted so user input can never smuggle
/// FTS5 syntax; tokens are ANDed (all must match). `None` when the query holds
/// no indexable token.
fn fts_match_expression(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{token}\""))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

/// Shared predicate fragment: visibility, liveness, category, temporal
///
/// Returns the SQL (with `?` placeholders) and the parameter values in order.
/// `alias` prefixes column references so the fragment works in both CTEs.
fn scope_predicate(request: &SearchRequest, alias: &str) -> (String, Vec<Value>) {
    let mut sql = format!(
        "({alias}tenant_id = ? OR {alias}is_public = 1) \
         AND {alias}deleted_at IS NULL AND {alias}expired_at IS NULL"
    );
    let mut params: Vec<Value> = vec![Value::from(request.tenant_id.clone())];

    if let Some(category) = request.category {
        sql.push_str(&format!(" AND {alias}category = ?"));
        params.push(Value::from(category.as_str().to_string()));
    }

    if let Some(at_time) = request.at_time {
        let ts = ts_to_sql(at_time);
        sql.push_str(&format!(
            " AND ({alias}valid_at IS NULL OR {alias}valid_at <= ?) \
             AND ({alias}invalid_at IS NULL OR {alias}invalid_at > ?)"
        ));
        params.push(Value::from(ts.clone()));
        params.push(Value::from(ts));

        // The version filter is only meaningful inside a point-in-time query
        if let Some(version) = &request.version {
            sql.push_str(&format!(" AND {alias}version = ?"));
            params.push(Value::from(version.clone()));
        }
    }

    (sql, params)
}

impl TursoStorage {
    /// Hybrid BM25+vector RRF search with quality boosting
    pub async fn search_knowledge(&self, request: &SearchRequest) -> Result<SearchPage> {
        let conn = self.get_connection()?;

        let (vector_pred, vector_params) = scope_predicate(request, "");
        let (text_pred, text_params) = scope_predicate(request, "ki.");

        // A query with no indexable token still runs the statement; the
        // sentinel token matches nothing so ranking is vector-only
        let match_expr = fts_match_expression(&request.query)
            .unwrap_or_else(|| "\"hmnomatchsentinel\"".to_string());

        let sql = format!(
            r#"
            WITH vector_results AS (
                SELECT id, ROW_NUMBER() OVER (ORDER BY distance) AS rnk
                FROM (
                    SELECT id, vector_distance_cos(embedding, vector32(?)) AS distance
                    FROM knowledge_items
                    WHERE {vector_pred} AND embedding IS NOT NULL
                    ORDER BY distance
                    LIMIT {CANDIDATE_DEPTH}
                )
            ),
            text_results AS (
                SELECT id, ROW_NUMBER() OVER (ORDER BY score) AS rnk
                FROM (
                    SELECT ki.id AS id, bm25(knowledge_fts) AS score
                    FROM knowledge_fts
                    JOIN knowledge_items ki ON ki.id = knowledge_fts.item_id
                    WHERE knowledge_fts MATCH ? AND {text_pred}
                    ORDER BY score
                    LIMIT {CANDIDATE_DEPTH}
                )
            ),
            rrf AS (
                SELECT id, SUM(1.0 / ({RRF_K} + rnk)) AS rrf_score
                FROM (
                    SELECT id, rnk FROM vector_results
                    UNION ALL
                    SELECT id, rnk FROM text_results
                )
                GROUP BY id
            )
            SELECT ki.id, ki.content, ki.content_hash, ki.category, ki.confidence,
                   ki.tenant_id,
                   rrf.rrf_score * (0.7 + 0.3 * ki.quality_score) AS final_score,
                   COUNT(*) OVER () AS total_count
            FROM rrf
            JOIN knowledge_items ki ON ki.id = rrf.id
            ORDER BY final_score DESC
            LIMIT ? OFFSET ?
            "#
        );

        let mut params: Vec<Value> = Vec::new();
        params.push(Value::from(embedding_to_sql(&request.embedding)?));
        params.extend(vector_params);
        params.push(Value::from(match_expr));
        params.extend(text_params);
        params.push(Value::from(request.limit as i64));
        params.push(Value::from(request.offset as i64));

        let mut rows = conn
            .query(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| Error::Storage(format!("Hybrid search failed: {e}")))?;

        let mut fetched: Vec<(KnowledgeSummary, String)> = Vec::new();
        let mut total_count: i64 = 0;
        while let Some(row) = next_row(&mut rows).await? {
            let id_raw: String = col!(row, 0)?;
            let content: String = col!(row, 1)?;
            let content_hash: String = col!(row, 2)?;
            let category_raw: String = col!(row, 3)?;
            let confidence: f64 = col!(row, 4)?;
            let tenant_id: String = col!(row, 5)?;
            let final_score: f64 = col!(row, 6)?;
            total_count = col!(row, 7)?;

            let category: KnowledgeCategory = category_raw.parse().map_err(Error::Storage)?;
            let title = {
                let truncated: String = content.chars().take(80).collect();
                if content.chars().count() > 80 {
                    format!("{truncated}...")
                } else {
                    truncated
                }
            };

            fetched.push((
                KnowledgeSummary {
                    id: uuid_from_sql(&id_raw)?,
                    title,
                    category,
                    confidence: confidence as f32,
                    tenant_attribution: tenant_id,
                    relevance_score: (final_score * 10_000.0).round() / 10_000.0,
                },
                content_hash,
            ));
        }

        // Deduplicate by content hash keeping the first (highest-ranked)
        // occurrence; a private copy surfaces before its public duplicate
        let mut seen: HashSet<String> = HashSet::new();
        let before = fetched.len();
        let results: Vec<KnowledgeSummary> = fetched
            .into_iter()
            .filter(|(_, hash)| seen.insert(hash.clone()))
            .map(|(summary, _)| summary)
            .collect();

        // Approximate total: shrink by the dedup reduction on this page
        let total_found = (total_count - (before - results.len()) as i64).max(0);

        debug!(
            "hybrid search: {} results (total ~{total_found}) for tenant {}",
            results.len(),
            request.tenant_id
        );

        let has_more = ((request.offset + request.limit) as i64) < total_found;
        let next_cursor = if has_more {
            Some(encode_cursor(request.offset + request.limit))
        } else {
            None
        };

        Ok(SearchPage {
            results,
            total_found,
            next_cursor,
        })
    }

    /// Top-k current items by cosine distance, for dedup Stage 1
    pub async fn find_similar_items(
        &self,
        embedding: &[f32],
        tenant_id: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarItem>> {
        let conn = self.get_connection()?;

        let sql = r#"
            SELECT id, content, content_hash, category, version,
                   vector_distance_cos(embedding, vector32(?)) AS distance
            FROM knowledge_items
            WHERE (tenant_id = ? OR is_public = 1)
              AND embedding IS NOT NULL
              AND deleted_at IS NULL
              AND expired_at IS NULL
            ORDER BY distance ASC
            LIMIT ?
        "#;

        let mut rows = conn
            .query(
                sql,
                libsql::params![embedding_to_sql(embedding)?, tenant_id, top_k as i64],
            )
            .await
            .map_err(|e| Error::Storage(format!("Similarity search failed: {e}")))?;

        let mut candidates = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            let id_raw: String = col!(row, 0)?;
            let category_raw: String = col!(row, 3)?;
            let distance: f64 = col!(row, 5)?;
            candidates.push(SimilarItem {
                id: uuid_from_sql(&id_raw)?,
                content: col!(row, 1)?,
                content_hash: col!(row, 2)?,
                category: category_raw.parse().map_err(Error::Storage)?,
                version: col!(row, 4)?,
                distance: distance as f32,
            });
        }
        Ok(candidates)
    }
}

/// Encode an offset as a URL-safe base64 cursor
pub fn encode_cursor(offset: usize) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(offset.to_string())
}

/// Decode a cursor back to an offset; any malformed input decodes to 0
pub fn decode_cursor(cursor: &str) -> usize {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD
        .decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
