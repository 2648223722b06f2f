use super::{RetrievedPassage, Retriever};
use crate::config::{Config, FaqConfig};
use crate::embedding::MatchResult;
use crate::error::Result;
use serde::Serialize;
use tracing::debug;

/// Context tier chosen for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Best FAQ similarity at or above the high threshold
    FaqStrong,
    /// Best FAQ similarity in `[medium, high)`
    FaqMedium,
    /// No FAQ match good enough, or no FAQ entries at all
    DocsOnly,
}

impl Tier {
    /// Map the best FAQ similarity to a tier. Both thresholds are inclusive
    /// lower bounds; `None` (empty FAQ partition) and NaN select `DocsOnly`.
    pub fn from_similarity(best: Option<f32>, high: f32, medium: f32) -> Tier {
        match best {
            Some(s) if s >= high => Tier::FaqStrong,
            Some(s) if s >= medium => Tier::FaqMedium,
            _ => Tier::DocsOnly,
        }
    }

    /// Label handed to the generation step
    pub fn context_type_label(&self) -> &'static str {
        match self {
            Tier::FaqStrong => "faq_only",
            Tier::FaqMedium => "faq_and_docs",
            Tier::DocsOnly => "docs_only",
        }
    }

    pub fn temperature(&self, faq: &FaqConfig) -> f32 {
        match self {
            Tier::FaqStrong => faq.temp_faq_only,
            Tier::FaqMedium => faq.temp_faq_and_docs,
            Tier::DocsOnly => faq.temp_docs_only,
        }
    }
}

/// Result of classifying one query
#[derive(Debug, Clone)]
pub struct ContextDecision {
    pub tier: Tier,
    /// Highest FAQ similarity seen, `None` when no FAQ was searched or found
    pub best_faq_similarity: Option<f32>,
    pub faq_matches: Vec<MatchResult>,
    pub doc_matches: Vec<MatchResult>,
    pub temperature: f32,
    pub context_type_label: &'static str,
}

impl ContextDecision {
    /// Passage texts in generation order, FAQ entries first
    pub fn context_passages(&self) -> Vec<String> {
        self.faq_matches
            .iter()
            .chain(self.doc_matches.iter())
            .map(|m| m.document.text.clone())
            .collect()
    }

    /// FAQ then general passages with their similarities
    pub fn passages(&self) -> Vec<RetrievedPassage> {
        self.faq_matches
            .iter()
            .chain(self.doc_matches.iter())
            .map(RetrievedPassage::from)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.faq_matches.is_empty() && self.doc_matches.is_empty()
    }
}

/// Chooses the context tier for each query.
///
/// The query is embedded once; the same vector searches the FAQ partition and,
/// depending on the tier, the general partition.
#[derive(Clone)]
pub struct ContextClassifier {
    faq: Retriever,
    docs: Retriever,
    faq_config: FaqConfig,
    default_top_k: usize,
    enable_faq: bool,
}

impl ContextClassifier {
    pub fn new(faq: Retriever, docs: Retriever, config: &Config) -> Self {
        Self {
            faq,
            docs,
            faq_config: config.faq.clone(),
            default_top_k: config.retrieval.default_top_k,
            enable_faq: config.chatbot.enable_faq,
        }
    }

    pub fn classify(&self, query: &str) -> Result<ContextDecision> {
        let vector = self.faq.embed_query(query)?;

        let mut faq_matches = if self.enable_faq {
            self.faq
                .retrieve_top_k_with_vector(&vector, self.faq_config.top_k_faqs)?
        } else {
            Vec::new()
        };
        let best = faq_matches.first().map(|m| m.similarity);

        let tier = Tier::from_similarity(
            best,
            self.faq_config.high_threshold,
            self.faq_config.medium_threshold,
        );

        let doc_matches = match tier {
            Tier::FaqStrong => {
                faq_matches.truncate(self.faq_config.num_faqs_high_match);
                Vec::new()
            }
            Tier::FaqMedium => {
                faq_matches.truncate(self.faq_config.num_faqs_medium_match);
                self.docs.retrieve_top_k_with_vector(
                    &vector,
                    self.faq_config.num_docs_medium_match,
                )?
            }
            Tier::DocsOnly => {
                faq_matches.clear();
                self.docs.retrieve_top_k_with_vector(&vector, self.default_top_k)?
            }
        };

        match best {
            Some(s) => debug!(
                "Classified query as {} (best FAQ similarity {:.3}, {} FAQ, {} docs)",
                tier.context_type_label(),
                s,
                faq_matches.len(),
                doc_matches.len()
            ),
            None => debug!(
                "Classified query as {} (no FAQ candidates, {} docs)",
                tier.context_type_label(),
                doc_matches.len()
            ),
        }

        Ok(ContextDecision {
            tier,
            best_faq_similarity: best,
            faq_matches,
            doc_matches,
            temperature: tier.temperature(&self.faq_config),
            context_type_label: tier.context_type_label(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{
        EmbeddingError, EmbeddingProvider, IndexConfig, Partition, VectorIndex,
    };
    use std::sync::Arc;

    struct AxisProvider;

    impl EmbeddingProvider for AxisProvider {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            crate::embedding::validate_text(text)?;
            Ok(vec![1.0, 0.0])
        }

        fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "axis"
        }
    }

    fn at_cosine(c: f32) -> Vec<f32> {
        vec![c, (1.0 - c * c).max(0.0).sqrt()]
    }

    fn classifier(faq_cosines: &[f32], doc_cosines: &[f32], config: &Config) -> ContextClassifier {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(AxisProvider);
        let faq = Arc::new(VectorIndex::in_memory(Partition::Faq, 2, IndexConfig::default()));
        let docs = Arc::new(VectorIndex::in_memory(
            Partition::General,
            2,
            IndexConfig::default(),
        ));
        for (i, c) in faq_cosines.iter().enumerate() {
            faq.upsert(&format!("faq{}", i), &format!("faq text {}", i), at_cosine(*c))
                .unwrap();
        }
        for (i, c) in doc_cosines.iter().enumerate() {
            docs.upsert(&format!("doc{}", i), &format!("doc text {}", i), at_cosine(*c))
                .unwrap();
        }
        ContextClassifier::new(
            Retriever::new(provider.clone(), faq),
            Retriever::new(provider, docs),
            config,
        )
    }

    #[test]
    fn test_tier_boundaries_inclusive() {
        assert_eq!(Tier::from_similarity(Some(0.75), 0.75, 0.65), Tier::FaqStrong);
        assert_eq!(Tier::from_similarity(Some(0.7499), 0.75, 0.65), Tier::FaqMedium);
        assert_eq!(Tier::from_similarity(Some(0.65), 0.75, 0.65), Tier::FaqMedium);
        assert_eq!(Tier::from_similarity(Some(0.6499), 0.75, 0.65), Tier::DocsOnly);
        assert_eq!(Tier::from_similarity(None, 0.75, 0.65), Tier::DocsOnly);
        assert_eq!(Tier::from_similarity(Some(f32::NAN), 0.75, 0.65), Tier::DocsOnly);
    }

    #[test]
    fn test_labels_and_temperatures() {
        let faq = Config::default().faq;
        assert_eq!(Tier::FaqStrong.context_type_label(), "faq_only");
        assert_eq!(Tier::FaqMedium.context_type_label(), "faq_and_docs");
        assert_eq!(Tier::DocsOnly.context_type_label(), "docs_only");
        assert_eq!(Tier::FaqStrong.temperature(&faq), 0.1);
        assert_eq!(Tier::FaqMedium.temperature(&faq), 0.2);
        assert_eq!(Tier::DocsOnly.temperature(&faq), 0.3);
    }

    #[test]
    fn test_strong_faq_match() {
        let config = Config::default();
        let c = classifier(&[0.80, 0.60, 0.50, 0.40, 0.30, 0.20], &[0.9, 0.8], &config);

        let decision = c.classify("¿Cómo pago la matrícula?").unwrap();
        assert_eq!(decision.tier, Tier::FaqStrong);
        assert_eq!(decision.faq_matches.len(), 3);
        assert!(decision.doc_matches.is_empty());
        assert_eq!(decision.temperature, 0.1);
        assert_eq!(decision.context_type_label, "faq_only");
        assert!((decision.best_faq_similarity.unwrap() - 0.80).abs() < 1e-4);
    }

    #[test]
    fn test_medium_faq_match() {
        let config = Config::default();
        let c = classifier(&[0.70, 0.60, 0.50], &[0.9, 0.8, 0.7], &config);

        let decision = c.classify("becas").unwrap();
        assert_eq!(decision.tier, Tier::FaqMedium);
        assert_eq!(decision.faq_matches.len(), 2);
        assert_eq!(decision.doc_matches.len(), 2);
        assert_eq!(decision.temperature, 0.2);

        let passages = decision.context_passages();
        assert_eq!(passages.len(), 4);
        assert_eq!(passages[0], "faq text 0");
        assert_eq!(passages[2], "doc text 0");
    }

    #[test]
    fn test_weak_faq_match() {
        let config = Config::default();
        let c = classifier(&[0.40], &[0.9, 0.8, 0.7, 0.6], &config);

        let decision = c.classify("horarios").unwrap();
        assert_eq!(decision.tier, Tier::DocsOnly);
        assert!(decision.faq_matches.is_empty());
        assert_eq!(decision.doc_matches.len(), 3);
        assert_eq!(decision.temperature, 0.3);
        assert_eq!(decision.context_type_label, "docs_only");
    }

    #[test]
    fn test_empty_faq_partition() {
        let config = Config::default();
        let c = classifier(&[], &[0.5], &config);

        let decision = c.classify("horarios").unwrap();
        assert_eq!(decision.tier, Tier::DocsOnly);
        assert_eq!(decision.best_faq_similarity, None);
        assert_eq!(decision.doc_matches.len(), 1);
    }

    #[test]
    fn test_everything_empty() {
        let config = Config::default();
        let c = classifier(&[], &[], &config);

        let decision = c.classify("horarios").unwrap();
        assert_eq!(decision.tier, Tier::DocsOnly);
        assert!(decision.is_empty());
    }

    #[test]
    fn test_faq_disabled() {
        let mut config = Config::default();
        config.chatbot.enable_faq = false;
        let c = classifier(&[0.95], &[0.5], &config);

        let decision = c.classify("becas").unwrap();
        assert_eq!(decision.tier, Tier::DocsOnly);
        assert_eq!(decision.best_faq_similarity, None);
        assert!(decision.faq_matches.is_empty());
    }

    #[test]
    fn test_blank_query_rejected() {
        let config = Config::default();
        let c = classifier(&[0.9], &[], &config);
        assert!(c.classify("  ").is_err());
    }
}
