use crate::config::{Config, SCHEMA_VERSION};
use crate::embedding::{model_dimension, supported_models, HASH_MODEL};
use crate::error::{RagtierError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_faq(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_ingestion(config, &mut errors);
        Self::validate_chatbot(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagtierError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        if embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if embedding.model.eq_ignore_ascii_case(HASH_MODEL) {
            return;
        }

        match model_dimension(&embedding.model) {
            Some(dim) if dim != embedding.dimension => errors.push(ValidationError::new(
                "embedding.dimension",
                format!(
                    "Model {} produces {} dimensions, configured {}",
                    embedding.model, dim, embedding.dimension
                ),
            )),
            Some(_) => {}
            None => errors.push(ValidationError::new(
                "embedding.model",
                format!(
                    "Unsupported model '{}'. Supported: {}, {}",
                    embedding.model,
                    supported_models().join(", "),
                    HASH_MODEL
                ),
            )),
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.index.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.index.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        if config.index.max_elements == 0 {
            errors.push(ValidationError::new(
                "index.max_elements",
                "Max elements must be greater than 0",
            ));
        }
    }

    fn validate_faq(config: &Config, errors: &mut Vec<ValidationError>) {
        let faq = &config.faq;

        for (path, value) in [
            ("faq.high_threshold", faq.high_threshold),
            ("faq.medium_threshold", faq.medium_threshold),
        ] {
            if !Self::is_unit_interval(value) {
                errors.push(ValidationError::new(
                    path,
                    format!("Threshold must be between 0.0 and 1.0, got {}", value),
                ));
            }
        }

        if faq.medium_threshold >= faq.high_threshold {
            errors.push(ValidationError::new(
                "faq.medium_threshold",
                format!(
                    "Medium threshold ({}) must be lower than high threshold ({})",
                    faq.medium_threshold, faq.high_threshold
                ),
            ));
        }

        for (path, value) in [
            ("faq.top_k_faqs", faq.top_k_faqs),
            ("faq.num_faqs_high_match", faq.num_faqs_high_match),
            ("faq.num_faqs_medium_match", faq.num_faqs_medium_match),
            ("faq.num_docs_medium_match", faq.num_docs_medium_match),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Count must be greater than 0"));
            }
        }

        for (path, value) in [
            ("faq.temp_faq_only", faq.temp_faq_only),
            ("faq.temp_faq_and_docs", faq.temp_faq_and_docs),
            ("faq.temp_docs_only", faq.temp_docs_only),
        ] {
            if !Self::is_unit_interval(value) {
                errors.push(ValidationError::new(
                    path,
                    format!("Temperature must be between 0.0 and 1.0, got {}", value),
                ));
            }
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.default_top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_top_k",
                "Default top-k must be greater than 0",
            ));
        }

        if !Self::is_unit_interval(retrieval.min_similarity_threshold) {
            errors.push(ValidationError::new(
                "retrieval.min_similarity_threshold",
                format!(
                    "Threshold must be between 0.0 and 1.0, got {}",
                    retrieval.min_similarity_threshold
                ),
            ));
        }

        if retrieval.max_documents_with_threshold == 0 {
            errors.push(ValidationError::new(
                "retrieval.max_documents_with_threshold",
                "Max documents must be greater than 0",
            ));
        }

        if retrieval.over_fetch_factor == 0 {
            errors.push(ValidationError::new(
                "retrieval.over_fetch_factor",
                "Over-fetch factor must be at least 1",
            ));
        }
    }

    fn validate_ingestion(config: &Config, errors: &mut Vec<ValidationError>) {
        let ingestion = &config.ingestion;

        if ingestion.enable_chunking {
            if ingestion.chunk_size == 0 {
                errors.push(ValidationError::new(
                    "ingestion.chunk_size",
                    "Chunk size must be greater than 0",
                ));
            }
            if ingestion.chunk_overlap >= ingestion.chunk_size {
                errors.push(ValidationError::new(
                    "ingestion.chunk_overlap",
                    "Chunk overlap must be smaller than chunk size",
                ));
            }
        }

        if ingestion.allowed_extensions.is_empty() {
            errors.push(ValidationError::new(
                "ingestion.allowed_extensions",
                "At least one file extension is required",
            ));
        }
    }

    fn validate_chatbot(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.chatbot.max_history == 0 {
            errors.push(ValidationError::new(
                "chatbot.max_history",
                "History size must be greater than 0",
            ));
        }
    }

    fn is_unit_interval(value: f32) -> bool {
        (0.0..=1.0).contains(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for(config: &Config) -> Vec<ValidationError> {
        match ConfigValidator::validate(config) {
            Err(RagtierError::ConfigValidation { errors }) => errors,
            Err(other) => panic!("unexpected error: {}", other),
            Ok(()) => Vec::new(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_threshold_ordering() {
        let mut config = Config::default();
        config.faq.medium_threshold = 0.75;
        let errors = errors_for(&config);
        assert!(errors.iter().any(|e| e.path == "faq.medium_threshold"));
    }

    #[test]
    fn test_threshold_range() {
        let mut config = Config::default();
        config.faq.high_threshold = 1.5;
        let errors = errors_for(&config);
        assert!(errors.iter().any(|e| e.path == "faq.high_threshold"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.faq.top_k_faqs = 0;
        config.faq.temp_docs_only = 1.2;
        config.chatbot.max_history = 0;
        config.retrieval.default_top_k = 0;

        let errors = errors_for(&config);
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_model_dimension_must_match() {
        let mut config = Config::default();
        config.embedding.dimension = 384;
        assert!(ConfigValidator::validate(&config).is_err());

        config.embedding.model = "all-MiniLM-L6-v2".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());

        config.embedding.model = "hash".to_string();
        config.embedding.dimension = 77;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_model() {
        let mut config = Config::default();
        config.embedding.model = "BAAI/bge-m3".to_string();
        let errors = errors_for(&config);
        assert!(errors.iter().any(|e| e.path == "embedding.model"));
    }

    #[test]
    fn test_chunk_overlap() {
        let mut config = Config::default();
        config.ingestion.enable_chunking = true;
        config.ingestion.chunk_overlap = config.ingestion.chunk_size;
        assert!(ConfigValidator::validate(&config).is_err());

        config.ingestion.enable_chunking = false;
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
