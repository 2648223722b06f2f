//! FNV-1a feature-hashing embedder: offline fallback that needs no model download.
//!
//! Character n-grams are hashed into buckets with a sign bit, then the vector
//! is L2-normalized. Scores are lexical, not semantic.
use super::provider::{normalize, validate_batch, validate_text};
use super::{EmbeddingError, EmbeddingProvider};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001B3;

/// Model name accepted in configuration to select this provider
pub const HASH_MODEL: &str = "hash";

#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
    ngram_range: (usize, usize),
    model_name: String,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InitializationError(
                "Hash embedder dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            ngram_range: (3, 4),
            model_name: format!("fnv1a-hash-{}", dimension),
        })
    }

    fn hash_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lower = text.to_lowercase();
        let chars: Vec<char> = lower.chars().collect();

        for n in self.ngram_range.0..=self.ngram_range.1 {
            if n > chars.len() {
                continue;
            }
            for window in chars.windows(n) {
                let ngram: String = window.iter().collect();
                let h = fnv1a(ngram.as_bytes());
                let bucket = (h as usize) % self.dimension;
                let sign = if (h >> 32) & 1 == 0 { 1.0f32 } else { -1.0f32 };
                vector[bucket] += sign;
            }
        }

        // Texts shorter than the smallest n-gram still need a direction
        if vector.iter().all(|x| *x == 0.0) {
            let h = fnv1a(lower.as_bytes());
            vector[(h as usize) % self.dimension] = 1.0;
        }

        normalize(&mut vector);
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        validate_text(text)?;
        Ok(self.hash_text(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        validate_batch(texts)?;
        Ok(texts.iter().map(|t| self.hash_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
