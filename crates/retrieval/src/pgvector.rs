//! PostgreSQL + pgvector runbook index.
//!
//! Reads the tables the ingestion pipeline writes:
//!
//! ```sql
//! langchain_pg_collection (uuid, name, cmetadata)
//! langchain_pg_embedding  (id, collection_id, embedding vector, document, cmetadata jsonb)
//! ```
//!
//! Passage provenance comes from `cmetadata->>'source'` and, for paginated
//! documents, the zero-based `cmetadata->'page'`.
//!
//! The connection pool is created on first search and then shared by every
//! conversation for the life of the process.
//!
//! # Feature gate
//!
//! This module is behind the `postgres` feature flag (on by default).

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use vcassist_core::error::RetrievalError;
use vcassist_core::retrieval::{Embedder, PassageIndex, RetrievedPassage};

const SEARCH_SQL: &str = "SELECT e.document, e.cmetadata \
     FROM langchain_pg_embedding e \
     JOIN langchain_pg_collection c ON e.collection_id = c.uuid \
     WHERE c.name = $1 \
     ORDER BY e.embedding <=> $2::vector ASC \
     LIMIT $3";

const MAX_CONNECTIONS: u32 = 5;

/// pgvector-backed passage index with a lazily opened pool.
pub struct PgVectorIndex {
    database_url: String,
    collection: String,
    embedder: Arc<dyn Embedder>,
    pool: OnceCell<PgPool>,
}

impl PgVectorIndex {
    /// Create an index handle. No connection is made until the first search.
    pub fn new(
        connection_string: &str,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            database_url: normalize_connection_string(connection_string),
            collection: collection.into(),
            embedder,
            pool: OnceCell::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn pool(&self) -> Result<&PgPool, RetrievalError> {
        self.pool
            .get_or_try_init(|| async {
                let pool = PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .connect(&self.database_url)
                    .await
                    .map_err(|e| RetrievalError::Search(format!("PostgreSQL connection failed: {e}")))?;
                info!(collection = %self.collection, "Connected to runbook index");
                Ok(pool)
            })
            .await
    }
}

#[async_trait]
impl PassageIndex for PgVectorIndex {
    fn name(&self) -> &str {
        "pgvector"
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        let embedding = self.embedder.embed_query(query).await?;
        let pool = self.pool().await?;

        let rows = sqlx::query(SEARCH_SQL)
            .bind(&self.collection)
            .bind(vector_literal(&embedding))
            .bind(top_k as i64)
            .fetch_all(pool)
            .await
            .map_err(|e| RetrievalError::Search(e.to_string()))?;

        debug!(collection = %self.collection, hits = rows.len(), "Vector search complete");
        rows.iter().map(row_to_passage).collect()
    }
}

/// Convert a result row into a passage.
fn row_to_passage(row: &PgRow) -> Result<RetrievedPassage, RetrievalError> {
    let text: Option<String> = row
        .try_get("document")
        .map_err(|e| RetrievalError::Search(format!("bad document column: {e}")))?;
    let metadata: Option<serde_json::Value> = row
        .try_get("cmetadata")
        .map_err(|e| RetrievalError::Search(format!("bad cmetadata column: {e}")))?;

    let (source, page) = passage_provenance(metadata.as_ref());
    Ok(RetrievedPassage {
        source,
        page,
        text: text.unwrap_or_default(),
    })
}

/// Extract `(source, page)` from passage metadata. Missing source is
/// reported as "unknown".
fn passage_provenance(metadata: Option<&serde_json::Value>) -> (String, Option<u32>) {
    let source = metadata
        .and_then(|m| m.get("source"))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown")
        .to_string();
    let page = metadata
        .and_then(|m| m.get("page"))
        .and_then(|p| p.as_u64())
        .and_then(|p| u32::try_from(p).ok());
    (source, page)
}

/// Format an embedding as a pgvector text literal.
fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Accept SQLAlchemy-style URLs (`postgresql+psycopg://`) as well as plain
/// PostgreSQL URLs.
fn normalize_connection_string(raw: &str) -> String {
    match raw.split_once("://") {
        Some((scheme, rest)) if scheme.starts_with("postgresql+") || scheme.starts_with("postgres+") => {
            format!("postgresql://{rest}")
        }
        _ => raw.to_string(),
    }
}

// ── Unit tests (no DB required) ──────────────────────────────────────────
