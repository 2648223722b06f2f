//! Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// Implementations must return unit-length vectors and must be safe to call
/// from many queries at once without mutating model state.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, preserving order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Rejects empty and whitespace-only text
pub fn validate_text(text: &str) -> Result<(), EmbeddingError> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::InvalidInput(
            "Text cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Rejects an empty batch or a batch containing any blank text
pub fn validate_batch(texts: &[String]) -> Result<(), EmbeddingError> {
    if texts.is_empty() {
        return Err(EmbeddingError::InvalidInput(
            "Batch cannot be empty".to_string(),
        ));
    }
    if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(EmbeddingError::InvalidInput(format!(
            "Text at position {} is empty",
            pos
        )));
    }
    Ok(())
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two vectors of equal length.
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a <= f32::EPSILON || mag_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Models known to this crate: (config name, fastembed model, dimension, approx download MB)
const SUPPORTED_MODELS: &[(&str, EmbeddingModel, usize, usize)] = &[
    (
        "multilingual-e5-large",
        EmbeddingModel::MultilingualE5Large,
        1024,
        2240,
    ),
    (
        "multilingual-e5-base",
        EmbeddingModel::MultilingualE5Base,
        768,
        1110,
    ),
    (
        "multilingual-e5-small",
        EmbeddingModel::MultilingualE5Small,
        384,
        470,
    ),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384, 130),
    ("bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15, 768, 440),
    ("all-MiniLM-L6-v2", EmbeddingModel::AllMiniLML6V2, 384, 90),
];

/// Default model: multilingual, 1024 dimensions
pub const DEFAULT_MODEL: &str = "multilingual-e5-large";

/// Dimension produced by a supported model, if the name is known
pub fn model_dimension(model_name: &str) -> Option<usize> {
    SUPPORTED_MODELS
        .iter()
        .find(|(name, ..)| name.eq_ignore_ascii_case(model_name))
        .map(|(_, _, dim, _)| *dim)
}

/// Names of every supported model
pub fn supported_models() -> Vec<&'static str> {
    SUPPORTED_MODELS.iter().map(|(name, ..)| *name).collect()
}

/// FastEmbed provider for local embedding generation
///
/// The model is loaded once at construction and shared read-only afterwards.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on-demand into the fastembed cache
    /// on first use. `multilingual-e5-large` is a ~2GB download.
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (name, embedding_model, dimension, model_size_mb) = SUPPORTED_MODELS
            .iter()
            .find(|(name, ..)| name.eq_ignore_ascii_case(model_name))
            .cloned()
            .ok_or_else(|| {
                EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: {}",
                    model_name,
                    supported_models().join(", ")
                ))
            })?;

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            name,
            dimension,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: name.to_string(),
            dimension,
        })
    }

    /// Create provider with the default model
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new(DEFAULT_MODEL)
    }

    fn finish(&self, mut embedding: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        normalize(&mut embedding);
        Ok(embedding)
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        validate_text(text)?;

        let embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        let embedding = embeddings.into_iter().next().ok_or_else(|| {
            EmbeddingError::GenerationError("No embeddings generated".to_string())
        })?;

        self.finish(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        validate_batch(texts)?;

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        embeddings.into_iter().map(|e| self.finish(e)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
