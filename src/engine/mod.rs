//! Engine facade
//!
//! Owns the embedding provider, both partition indexes, the context
//! classifier and the session registry, and exposes the operations the CLI
//! and any embedding application call.

mod generation;
mod ingest;

pub use generation::{Answer, Generator};
pub use ingest::{chunk_text, IngestReport};

use crate::config::{Config, ConfigValidator};
use crate::embedding::{
    content_hash, create_provider, validate_text, EmbeddingProvider, Partition, VectorIndex,
};
use crate::error::{RagtierError, Result};
use crate::retrieval::{ContextClassifier, ContextDecision, RetrievedPassage, Retriever};
use crate::session::{lock_session, SessionRegistry, Turn};
use crate::storage::{open_database, Database};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// What a single `ingest` call did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// New document
    Inserted(String),
    /// Existing document with different text was overwritten
    Replaced(String),
    /// Same text already indexed; nothing was embedded
    Unchanged(String),
}

impl IngestOutcome {
    pub fn id(&self) -> &str {
        match self {
            IngestOutcome::Inserted(id)
            | IngestOutcome::Replaced(id)
            | IngestOutcome::Unchanged(id) => id,
        }
    }
}

/// Index counts and model identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub document_count: usize,
    pub faq_count: usize,
    pub general_count: usize,
    pub embedding_dimension: usize,
    pub embedding_model: String,
}

/// Retrieval-and-tiering engine
pub struct Engine {
    config: Config,
    provider: Arc<dyn EmbeddingProvider>,
    faq: Retriever,
    docs: Retriever,
    classifier: ContextClassifier,
    sessions: SessionRegistry,
}

impl Engine {
    /// Validate the configuration, load the configured model and open the
    /// persistent indexes under the data directory.
    ///
    /// Configuration problems are fatal and reported before anything loads.
    pub fn new(config: Config) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        info!(
            "Loading embedding model {} ({}D)",
            config.embedding.model, config.embedding.dimension
        );
        let provider = create_provider(&config.embedding.model, config.embedding.dimension)?;

        let data_dir = config.data_dir()?;
        let store = Arc::new(open_database(&data_dir)?);

        Self::with_provider(config, provider, Some(store))
    }

    /// Build an engine around an existing provider. Without a store the
    /// indexes live only in memory.
    pub fn with_provider(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
        store: Option<Arc<Database>>,
    ) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        let dimension = config.embedding.dimension;
        if provider.dimension() != dimension {
            return Err(RagtierError::DimensionMismatch {
                expected: dimension,
                actual: provider.dimension(),
            });
        }

        let open = |partition: Partition| -> Result<Arc<VectorIndex>> {
            let index = match &store {
                Some(store) => VectorIndex::open(
                    partition,
                    dimension,
                    config.index.clone(),
                    Arc::clone(store),
                    provider.model_name(),
                )?,
                None => VectorIndex::in_memory(partition, dimension, config.index.clone())
                    .with_model(provider.model_name()),
            };
            Ok(Arc::new(index))
        };

        let over_fetch = config.retrieval.over_fetch_factor;
        let faq = Retriever::new(Arc::clone(&provider), open(Partition::Faq)?)
            .with_over_fetch(over_fetch);
        let docs = Retriever::new(Arc::clone(&provider), open(Partition::General)?)
            .with_over_fetch(over_fetch);
        let classifier = ContextClassifier::new(faq.clone(), docs.clone(), &config);
        let sessions = SessionRegistry::new(config.chatbot.max_history);

        info!(
            "Engine ready: {} FAQ, {} general documents ({}, {}D)",
            faq.index().count(),
            docs.index().count(),
            provider.model_name(),
            dimension
        );

        Ok(Self {
            config,
            provider,
            faq,
            docs,
            classifier,
            sessions,
        })
    }

    /// In-memory engine, mostly for tests and one-shot tools
    pub fn in_memory(config: Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Self::with_provider(config, provider, None)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn index(&self, partition: Partition) -> &Arc<VectorIndex> {
        self.retriever(partition).index()
    }

    fn retriever(&self, partition: Partition) -> &Retriever {
        match partition {
            Partition::Faq => &self.faq,
            Partition::General => &self.docs,
        }
    }

    /// Decide the context tier for a query and gather its passages
    pub fn classify(&self, query: &str) -> Result<ContextDecision> {
        self.classifier.classify(query)
    }

    /// Embed and index one document.
    ///
    /// Re-ingesting a source name overwrites the previous entry; identical
    /// text is detected by content hash and skipped without embedding.
    pub fn ingest(&self, source_name: &str, text: &str, partition: Partition) -> Result<IngestOutcome> {
        if source_name.trim().is_empty() {
            return Err(RagtierError::InvalidInput(
                "Source name cannot be empty".to_string(),
            ));
        }
        validate_text(text)?;

        let index = self.index(partition);
        let existing = index.get(source_name);
        if let Some(doc) = &existing {
            if doc.content_hash == content_hash(text) {
                debug!("{} unchanged, skipping", source_name);
                return Ok(IngestOutcome::Unchanged(doc.id.clone()));
            }
        }

        let vector = self.provider.embed(text)?;
        let id = index.upsert(source_name, text, vector)?;

        Ok(if existing.is_some() {
            IngestOutcome::Replaced(id)
        } else {
            IngestOutcome::Inserted(id)
        })
    }

    /// Delete a source, chunks included, from both partitions; true if
    /// anything was removed
    pub fn remove(&self, source_name: &str) -> Result<bool> {
        let removed =
            self.faq.index().delete_source(source_name)? + self.docs.index().delete_source(source_name)?;
        if removed > 0 {
            info!("Removed {} ({} documents)", source_name, removed);
        }
        Ok(removed > 0)
    }

    /// Clear both partitions, returning how many documents were removed
    pub fn reset(&self) -> Result<usize> {
        let removed = self.faq.index().delete_all()? + self.docs.index().delete_all()?;
        info!("Reset indexes: {} documents removed", removed);
        Ok(removed)
    }

    pub fn stats(&self) -> EngineStats {
        let faq_count = self.faq.index().count();
        let general_count = self.docs.index().count();
        EngineStats {
            document_count: faq_count + general_count,
            faq_count,
            general_count,
            embedding_dimension: self.provider.dimension(),
            embedding_model: self.provider.model_name().to_string(),
        }
    }

    /// Threshold retrieval over the general partition using the configured
    /// minimum similarity and result cap
    pub fn search_documents(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        self.docs.retrieve_with_threshold(
            query,
            self.config.retrieval.min_similarity_threshold,
            self.config.retrieval.max_documents_with_threshold,
        )
    }

    /// Plain top-k retrieval from one partition
    pub fn retrieve(&self, query: &str, partition: Partition, k: usize) -> Result<Vec<RetrievedPassage>> {
        self.retriever(partition).retrieve_top_k(query, k)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Turns recorded for a session, oldest first
    pub fn history(&self, session_id: &str) -> Result<Vec<Turn>> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| RagtierError::SessionNotFound {
                id: session_id.to_string(),
            })?;
        let turns = lock_session(&handle).snapshot();
        Ok(turns)
    }

    /// Most recent turn of a session, if any
    pub fn last_turn(&self, session_id: &str) -> Result<Option<Turn>> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| RagtierError::SessionNotFound {
                id: session_id.to_string(),
            })?;
        let turn = lock_session(&handle).latest().cloned();
        Ok(turn)
    }

    /// Forget a session's turns but keep the session
    pub fn clear_history(&self, session_id: &str) -> Result<()> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| RagtierError::SessionNotFound {
                id: session_id.to_string(),
            })?;
        lock_session(&handle).clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingProvider;

    fn engine() -> Engine {
        let mut config = Config::default();
        config.embedding.model = "hash".to_string();
        config.embedding.dimension = 128;
        let provider = Arc::new(HashEmbeddingProvider::new(128).unwrap());
        Engine::in_memory(config, provider).unwrap()
    }

    #[test]
    fn test_ingest_outcomes() {
        let engine = engine();

        let first = engine
            .ingest("becas.md", "Las becas se solicitan en marzo.", Partition::Faq)
            .unwrap();
        assert_eq!(first, IngestOutcome::Inserted("becas.md".to_string()));

        let again = engine
            .ingest("becas.md", "Las becas se solicitan en marzo.", Partition::Faq)
            .unwrap();
        assert_eq!(again, IngestOutcome::Unchanged("becas.md".to_string()));

        let changed = engine
            .ingest("becas.md", "Las becas se solicitan en abril.", Partition::Faq)
            .unwrap();
        assert_eq!(changed, IngestOutcome::Replaced("becas.md".to_string()));

        assert_eq!(engine.stats().faq_count, 1);
    }

    #[test]
    fn test_ingest_rejects_blank() {
        let engine = engine();
        assert!(matches!(
            engine.ingest("a.md", "   ", Partition::General),
            Err(RagtierError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.ingest(" ", "text", Partition::General),
            Err(RagtierError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_remove_and_reset() {
        let engine = engine();
        engine.ingest("a.md", "alpha", Partition::Faq).unwrap();
        engine.ingest("b.md", "beta", Partition::General).unwrap();
        engine.ingest("c.md", "gamma", Partition::General).unwrap();

        assert!(engine.remove("a.md").unwrap());
        assert!(!engine.remove("a.md").unwrap());
        assert_eq!(engine.stats().document_count, 2);

        assert_eq!(engine.reset().unwrap(), 2);
        assert_eq!(engine.stats().document_count, 0);
        assert_eq!(engine.reset().unwrap(), 0);
    }

    #[test]
    fn test_stats_reports_model() {
        let engine = engine();
        let stats = engine.stats();
        assert_eq!(stats.embedding_dimension, 128);
        assert_eq!(stats.embedding_model, "fnv1a-hash-128");
    }

    #[test]
    fn test_provider_dimension_must_match_config() {
        let config = Config::default();
        let provider = Arc::new(HashEmbeddingProvider::new(64).unwrap());
        assert!(matches!(
            Engine::in_memory(config, provider),
            Err(RagtierError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_config_refuses_to_start() {
        let mut config = Config::default();
        config.embedding.model = "hash".to_string();
        config.embedding.dimension = 32;
        config.faq.medium_threshold = 0.9;
        let provider = Arc::new(HashEmbeddingProvider::new(32).unwrap());

        let err = Engine::in_memory(config, provider).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_session_history() {
        let engine = engine();
        assert!(matches!(
            engine.history("nope"),
            Err(RagtierError::SessionNotFound { .. })
        ));
        assert!(engine.clear_history("nope").is_err());
        assert!(engine.last_turn("nope").is_err());
    }

    #[test]
    fn test_remove_takes_chunks() {
        let engine = engine();
        engine.ingest("largo.md#1", "primera parte", Partition::General).unwrap();
        engine.ingest("largo.md#2", "segunda parte", Partition::General).unwrap();
        engine.ingest("largo.md.bak", "copia", Partition::General).unwrap();

        assert!(engine.remove("largo.md").unwrap());
        assert_eq!(engine.stats().general_count, 1);
        assert!(engine.index(Partition::General).exists("largo.md.bak"));
    }

    #[test]
    fn test_in_memory_documents_carry_model() {
        let engine = engine();
        engine.ingest("a.md", "alpha", Partition::Faq).unwrap();
        let doc = engine.index(Partition::Faq).get("a.md").unwrap();
        assert_eq!(doc.model, "fnv1a-hash-128");
    }
}
