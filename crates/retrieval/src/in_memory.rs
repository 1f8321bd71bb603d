//! In-memory passage index: useful for testing and offline runs.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use vcassist_core::error::RetrievalError;
use vcassist_core::retrieval::{Embedder, PassageIndex, RetrievedPassage};
use crate::vector::{EmbeddedPassage, rank_passages};

/// Passages below this similarity are not returned.
const MIN_SCORE: f32 = 0.05;

/// An index that keeps embedded passages in a Vec and ranks them by cosine
/// similarity.
pub struct InMemoryIndex {
    entries: Arc<RwLock<Vec<EmbeddedPassage>>>,
    embedder: Arc<dyn Embedder>,
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            embedder,
        }
    }

    /// Embed and store a passage.
    pub async fn add(&self, passage: RetrievedPassage) -> Result<(), RetrievalError> {
        let embedding = self.embedder.embed_query(&passage.text).await?;
        self.entries.write().await.push(EmbeddedPassage { passage, embedding });
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl PassageIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        let query_embedding = self.embedder.embed_query(query).await?;
        let entries = self.entries.read().await;
        Ok(rank_passages(&entries, &query_embedding, top_k, MIN_SCORE)
            .into_iter()
            .map(|(_, passage)| passage)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;

    fn passage(source: &str, page: Option<u32>, text: &str) -> RetrievedPassage {
        RetrievedPassage {
            source: source.into(),
            page,
            text: text.into(),
        }
    }

    async fn seeded() -> InMemoryIndex {
        let index = InMemoryIndex::new(Arc::new(HashingEmbedder::default()));
        index
            .add(passage("runbooks/dr.pdf", Some(2), "DR procedure for cluster failover to the secondary site"))
            .await
            .unwrap();
        index
            .add(passage("runbooks/dr.pdf", Some(3), "Verify cluster failover completed and HA is healthy"))
            .await
            .unwrap();
        index
            .add(passage("runbooks/certs.md", None, "Rotate TLS certificates on the appliance"))
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn search_returns_relevant_passages_first() {
        let index = seeded().await;
        let results = index.search("cluster failover", 4).await.unwrap();
        assert!(results.len() >= 2);
        assert_eq!(results[0].source, "runbooks/dr.pdf");
        assert_eq!(results[1].source, "runbooks/dr.pdf");
    }

    #[tokio::test]
    async fn search_respects_top_k() {
        let index = seeded().await;
        let results = index.search("cluster failover", 1).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn blank_query_finds_nothing() {
        let index = seeded().await;
        let results = index.search("   ", 4).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn empty_index() {
        let index = InMemoryIndex::new(Arc::new(HashingEmbedder::default()));
        assert!(index.is_empty().await);
        assert!(index.search("anything", 4).await.unwrap().is_empty());
    }
}
