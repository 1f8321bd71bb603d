//! Query embedders.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use vcassist_core::error::RetrievalError;
use vcassist_core::provider::{EmbeddingRequest, Provider};
use vcassist_core::retrieval::Embedder;

/// Embeds queries through a model provider's embedding endpoint.
///
/// Must use the same model the ingestion pipeline used, or distances are
/// meaningless.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding("provider returned no vectors".into()))
    }
}

/// Deterministic bag-of-words embedder.
///
/// Hashes lowercase alphanumeric tokens into a fixed number of buckets and
/// L2-normalises the result. Texts sharing vocabulary land close together,
/// which is enough for offline runs and tests.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.embed(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;
    use vcassist_core::error::ProviderError;
    use vcassist_core::message::Message;
    use vcassist_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};

    #[test]
    fn hashing_is_deterministic_and_case_insensitive() {
        let embedder = HashingEmbedder::new(64);
        assert_eq!(embedder.embed("Cluster Failover"), embedder.embed("cluster failover"));
    }

    #[test]
    fn hashing_prefers_shared_vocabulary() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed("cluster failover procedure");
        let related = embedder.embed("DR procedure for cluster failover");
        let unrelated = embedder.embed("rotate TLS certificates on the appliance");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed("  ").iter().all(|v| *v == 0.0));
    }

    struct FixedEmbeddings(Vec<Vec<f32>>);

    #[async_trait]
    impl Provider for FixedEmbeddings {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(""),
                usage: None,
                model: "none".into(),
            })
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                embeddings: self.0.clone(),
                model: request.model,
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn provider_embedder_returns_first_vector() {
        let embedder = ProviderEmbedder::new(Arc::new(FixedEmbeddings(vec![vec![0.5, 0.5]])), "embed-v3");
        assert_eq!(embedder.embed_query("q").await.unwrap(), vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn provider_embedder_rejects_empty_response() {
        let embedder = ProviderEmbedder::new(Arc::new(FixedEmbeddings(vec![])), "embed-v3");
        assert!(matches!(
            embedder.embed_query("q").await,
            Err(RetrievalError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn provider_without_embeddings_surfaces_error() {
        struct ChatOnly;

        #[async_trait]
        impl Provider for ChatOnly {
            fn name(&self) -> &str {
                "chat_only"
            }
            async fn complete(&self, _r: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
                Err(ProviderError::Network("unused".into()))
            }
        }

        let embedder = ProviderEmbedder::new(Arc::new(ChatOnly), "m");
        let err = embedder.embed_query("q").await.unwrap_err();
        assert!(err.to_string().contains("chat_only"));
    }
}
