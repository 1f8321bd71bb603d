//! Runbook index backends for vcassist.
//!
//! Every backend implements `vcassist_core::PassageIndex`. The pgvector
//! backend reads what the ingestion pipeline wrote; the in-memory backend
//! serves tests and offline demos.

pub mod embedder;
pub mod in_memory;
pub mod vector;

#[cfg(feature = "postgres")]
pub mod pgvector;

pub use embedder::{HashingEmbedder, ProviderEmbedder};
pub use in_memory::InMemoryIndex;
pub use vector::{EmbeddedPassage, cosine_similarity, rank_passages};

#[cfg(feature = "postgres")]
pub use pgvector::PgVectorIndex;
