//! Configuration management for ragtier
//!
//! One immutable `Config` is built at startup (TOML file, then
//! `RAGTIER_<SECTION>__<KEY>` environment overrides), validated eagerly, and
//! handed to every component.

use crate::embedding::{IndexConfig, DEFAULT_MODEL};
use crate::error::{RagtierError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "RAGTIER_";

/// Supported configuration schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    pub faq: FaqConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    pub chatbot: ChatbotConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory; `~/` is expanded against the home directory
    pub data_dir: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name, or "hash" for the offline feature-hashing embedder
    pub model: String,
    /// Vector dimension, fixed for the lifetime of an index
    pub dimension: usize,
    /// Texts embedded per batch during ingestion
    pub batch_size: usize,
}

/// FAQ tiering thresholds and per-tier generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqConfig {
    /// Best FAQ similarity at or above this is a strong FAQ match
    pub high_threshold: f32,
    /// Best FAQ similarity at or above this (and below high) is a medium match
    pub medium_threshold: f32,
    /// FAQ candidates retrieved per query
    pub top_k_faqs: usize,
    pub num_faqs_high_match: usize,
    pub num_faqs_medium_match: usize,
    pub num_docs_medium_match: usize,
    pub temp_faq_only: f32,
    pub temp_faq_and_docs: f32,
    pub temp_docs_only: f32,
}

/// General retrieval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Documents forwarded in the docs-only tier
    pub default_top_k: usize,
    pub min_similarity_threshold: f32,
    pub max_documents_with_threshold: usize,
    /// Candidates requested per wanted result before threshold filtering
    #[serde(default = "default_over_fetch")]
    pub over_fetch_factor: usize,
}

fn default_over_fetch() -> usize {
    2
}

/// Folder ingestion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub docs_folder: PathBuf,
    pub faq_folder: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub enable_chunking: bool,
    /// Chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            docs_folder: PathBuf::from("data/docs"),
            faq_folder: PathBuf::from("data/docs/faq"),
            allowed_extensions: vec!["md".to_string(), "txt".to_string()],
            enable_chunking: false,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Conversation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatbotConfig {
    /// Turns kept per session
    pub max_history: usize,
    /// When false every query goes straight to the docs-only tier
    pub enable_faq: bool,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagtierError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagtierError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.apply_env_overrides()?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Load from `path` if given, else the default location if it exists,
    /// else defaults. Overrides and validation apply in every case.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Self::default_path()?;
        if default_path.exists() {
            return Self::load(&default_path);
        }

        tracing::warn!(
            "Config file not found, using defaults. Run 'ragtier config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides()?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RagtierError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagtierError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RAGTIER_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `(name, value)` overrides; names without the prefix are ignored
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                self.set_value(config_key, &value)?;
            }
        }
        Ok(())
    }

    fn set_value(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = parse(path, value)?,
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse(path, value)?,
            "FAQ__HIGH_THRESHOLD" => self.faq.high_threshold = parse(path, value)?,
            "FAQ__MEDIUM_THRESHOLD" => self.faq.medium_threshold = parse(path, value)?,
            "FAQ__TOP_K_FAQS" => self.faq.top_k_faqs = parse(path, value)?,
            "FAQ__NUM_FAQS_HIGH_MATCH" => self.faq.num_faqs_high_match = parse(path, value)?,
            "FAQ__NUM_FAQS_MEDIUM_MATCH" => self.faq.num_faqs_medium_match = parse(path, value)?,
            "FAQ__NUM_DOCS_MEDIUM_MATCH" => self.faq.num_docs_medium_match = parse(path, value)?,
            "FAQ__TEMP_FAQ_ONLY" => self.faq.temp_faq_only = parse(path, value)?,
            "FAQ__TEMP_FAQ_AND_DOCS" => self.faq.temp_faq_and_docs = parse(path, value)?,
            "FAQ__TEMP_DOCS_ONLY" => self.faq.temp_docs_only = parse(path, value)?,
            "RETRIEVAL__DEFAULT_TOP_K" => self.retrieval.default_top_k = parse(path, value)?,
            "RETRIEVAL__MIN_SIMILARITY_THRESHOLD" => {
                self.retrieval.min_similarity_threshold = parse(path, value)?
            }
            "RETRIEVAL__MAX_DOCUMENTS_WITH_THRESHOLD" => {
                self.retrieval.max_documents_with_threshold = parse(path, value)?
            }
            "INGESTION__DOCS_FOLDER" => self.ingestion.docs_folder = PathBuf::from(value),
            "INGESTION__FAQ_FOLDER" => self.ingestion.faq_folder = PathBuf::from(value),
            "INGESTION__ENABLE_CHUNKING" => self.ingestion.enable_chunking = parse(path, value)?,
            "INGESTION__CHUNK_SIZE" => self.ingestion.chunk_size = parse(path, value)?,
            "INGESTION__CHUNK_OVERLAP" => self.ingestion.chunk_overlap = parse(path, value)?,
            "CHATBOT__MAX_HISTORY" => self.chatbot.max_history = parse(path, value)?,
            "CHATBOT__ENABLE_FAQ" => self.chatbot.enable_faq = parse(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RagtierError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("ragtier").join("config.toml"))
    }

    /// Data directory with `~/` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }
}

fn parse<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RagtierError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

/// Expand a leading `~/` against the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RagtierError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| RagtierError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.ragtier"),
            },
            embedding: EmbeddingConfig {
                model: DEFAULT_MODEL.to_string(),
                dimension: 1024,
                batch_size: 32,
            },
            index: IndexConfig::default(),
            faq: FaqConfig {
                high_threshold: 0.75,
                medium_threshold: 0.65,
                top_k_faqs: 5,
                num_faqs_high_match: 3,
                num_faqs_medium_match: 2,
                num_docs_medium_match: 2,
                temp_faq_only: 0.1,
                temp_faq_and_docs: 0.2,
                temp_docs_only: 0.3,
            },
            retrieval: RetrievalConfig {
                default_top_k: 3,
                min_similarity_threshold: 0.3,
                max_documents_with_threshold: 10,
                over_fetch_factor: default_over_fetch(),
            },
            ingestion: IngestionConfig::default(),
            chatbot: ChatbotConfig {
                max_history: 10,
                enable_faq: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_match_tiering_table() {
        let config = Config::default();
        assert_eq!(config.faq.high_threshold, 0.75);
        assert_eq!(config.faq.medium_threshold, 0.65);
        assert_eq!(config.faq.top_k_faqs, 5);
        assert_eq!(config.retrieval.default_top_k, 3);
        assert_eq!(config.embedding.dimension, 1024);
        assert_eq!(config.chatbot.max_history, 10);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.faq, config.faq);
        assert_eq!(loaded.retrieval, config.retrieval);
        assert_eq!(loaded.index, config.index);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(RagtierError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(vars(&[
                ("RAGTIER_FAQ__HIGH_THRESHOLD", "0.8"),
                ("RAGTIER_CHATBOT__ENABLE_FAQ", "false"),
                ("RAGTIER_EMBEDDING__MODEL", "hash"),
                ("UNRELATED", "1"),
            ]))
            .unwrap();

        assert_eq!(config.faq.high_threshold, 0.8);
        assert!(!config.chatbot.enable_faq);
        assert_eq!(config.embedding.model, "hash");
    }

    #[test]
    fn test_unparseable_override() {
        let mut config = Config::default();
        let result = config.apply_overrides(vars(&[("RAGTIER_FAQ__TOP_K_FAQS", "many")]));
        assert!(matches!(
            result,
            Err(RagtierError::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_invalid_thresholds_are_fatal() {
        let mut config = Config::default();
        config.faq.medium_threshold = 0.9;
        let content = toml::to_string_pretty(&config).unwrap();

        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_expand_path() {
        let plain = expand_path(Path::new("/tmp/x")).unwrap();
        assert_eq!(plain, PathBuf::from("/tmp/x"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path(Path::new("~/data")).unwrap(), home.join("data"));
        }
    }
}
