use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;

/// Main error type for ragtier
#[derive(Error, Debug)]
pub enum RagtierError {
    /// Empty text, empty batch or similar caller mistakes
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector shape inconsistent with the index configuration
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Embedding model or index backend unreachable or corrupt
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Session not found
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    /// Failure reported by the generation collaborator
    #[error("Generation failed: {0}")]
    Generation(#[source] anyhow::Error),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl RagtierError {
    /// True for errors that make the process unable to start
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RagtierError::Config(_)
                | RagtierError::ConfigValidation { .. }
                | RagtierError::ConfigNotFound { .. }
                | RagtierError::InvalidConfigValue { .. }
        )
    }
}

impl From<EmbeddingError> for RagtierError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::InvalidInput(msg) => RagtierError::InvalidInput(msg),
            EmbeddingError::DimensionMismatch { expected, actual } => {
                RagtierError::DimensionMismatch { expected, actual }
            }
            EmbeddingError::InitializationError(msg) | EmbeddingError::GenerationError(msg) => {
                RagtierError::UpstreamUnavailable(msg)
            }
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for ragtier operations
pub type Result<T> = std::result::Result<T, RagtierError>;
