//! Retrieval contract: semantic search over the indexed runbook corpus.
//!
//! The index is populated by an external ingestion pipeline; this side only
//! queries it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::RetrievalError;

/// One ranked excerpt returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Document the excerpt came from (file path or URL)
    pub source: String,

    /// Zero-based page index, when the document is paginated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    pub text: String,
}

/// Nearest-neighbour search over the runbook corpus.
#[async_trait]
pub trait PassageIndex: Send + Sync {
    /// Backend name for logs (e.g. "pgvector", "in_memory").
    fn name(&self) -> &str;

    /// Return at most `top_k` passages, most relevant first.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<RetrievedPassage>, RetrievalError>;
}

/// Turns query text into a vector in the index's embedding space.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, RetrievalError>;
}
