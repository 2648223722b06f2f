//! Embedding and vector indexing
//!
//! - `EmbeddingProvider` trait with FastEmbed and feature-hashing implementations
//! - `VectorIndex`: one per partition, flat scan or HNSW, cosine metric
//! - document identity and the byte codec used by the store
mod codec;
mod document;
mod hash_provider;
mod provider;
mod vector_index;

pub use codec::{bytes_to_embedding, embedding_to_bytes};
pub use document::{
    belongs_to_source, content_hash, document_id, Document, MatchResult, Partition,
};
pub use hash_provider::{HashEmbeddingProvider, HASH_MODEL};
pub use provider::{
    cosine_similarity, model_dimension, normalize, supported_models, validate_batch,
    validate_text, EmbeddingError, EmbeddingProvider, FastEmbedProvider, DEFAULT_MODEL,
};
pub use vector_index::{VectorIndex, METRIC};

use serde::{Deserialize, Serialize};

/// Configuration for the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// HNSW construction parameter (higher = better recall, slower build)
    pub hnsw_ef_construction: usize,
    /// HNSW M parameter (number of connections per layer)
    pub hnsw_m: usize,
    /// HNSW search parameter (higher = better recall, slower search)
    pub hnsw_ef_search: usize,
    /// Expected capacity used to size the HNSW layers
    pub max_elements: usize,
    /// Partitions up to this size are searched exhaustively
    pub flat_search_limit: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hnsw_ef_construction: 200,
            hnsw_m: 16,
            hnsw_ef_search: 64,
            max_elements: 100_000,
            flat_search_limit: 2048,
        }
    }
}

/// Build the provider named by `model`: `"hash"` selects the feature-hashing
/// embedder at `dimension`, anything else is loaded through FastEmbed.
pub fn create_provider(
    model: &str,
    dimension: usize,
) -> Result<std::sync::Arc<dyn EmbeddingProvider>, EmbeddingError> {
    if model.eq_ignore_ascii_case(HASH_MODEL) {
        return Ok(std::sync::Arc::new(HashEmbeddingProvider::new(dimension)?));
    }

    let provider = FastEmbedProvider::new(model)?;
    if provider.dimension() != dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: provider.dimension(),
        });
    }
    Ok(std::sync::Arc::new(provider))
}
