//! Seam to the external answer generator

use super::Engine;
use crate::error::{RagtierError, Result};
use crate::retrieval::ContextDecision;
use crate::session::lock_session;
use tracing::debug;

/// Produces an answer from a query and its retrieved context.
///
/// Implementations wrap an LLM client; none is bundled.
pub trait Generator: Send + Sync {
    /// `passages` are ordered FAQ entries first; `context_type` is one of
    /// `faq_only`, `faq_and_docs` or `docs_only`.
    fn generate(
        &self,
        query: &str,
        passages: &[String],
        temperature: f32,
        context_type: &str,
    ) -> anyhow::Result<String>;
}

/// Generated reply plus the decision that shaped it
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub decision: ContextDecision,
}

impl Engine {
    /// Classify `query`, hand the context to `generator` and record the turn
    /// in `session_id`'s history (created on first use).
    ///
    /// Calls for the same session are serialized; a failed generation leaves
    /// the history untouched.
    pub fn answer(
        &self,
        query: &str,
        generator: &dyn Generator,
        session_id: &str,
    ) -> Result<Answer> {
        let handle = self.sessions().get_or_create(session_id);
        let mut history = lock_session(&handle);

        let decision = self.classify(query)?;
        let passages = decision.context_passages();

        let text = generator
            .generate(
                query,
                &passages,
                decision.temperature,
                decision.context_type_label,
            )
            .map_err(RagtierError::Generation)?;

        history.append(query, text.as_str());
        debug!(
            "Session {}: recorded turn {} ({})",
            session_id,
            history.len(),
            decision.context_type_label
        );

        Ok(Answer { text, decision })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::{HashEmbeddingProvider, Partition};
    use crate::retrieval::Tier;
    use std::sync::{Arc, Mutex};

    /// Records every call and echoes the context type
    #[derive(Default)]
    struct RecordingGenerator {
        calls: Mutex<Vec<(usize, f32, String)>>,
    }

    impl Generator for RecordingGenerator {
        fn generate(
            &self,
            _query: &str,
            passages: &[String],
            temperature: f32,
            context_type: &str,
        ) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((passages.len(), temperature, context_type.to_string()));
            Ok(format!("answer ({})", context_type))
        }
    }

    struct FailingGenerator;

    impl Generator for FailingGenerator {
        fn generate(&self, _: &str, _: &[String], _: f32, _: &str) -> anyhow::Result<String> {
            anyhow::bail!("rate limited")
        }
    }

    fn engine() -> Engine {
        let mut config = Config::default();
        config.embedding.model = "hash".to_string();
        config.embedding.dimension = 256;
        config.chatbot.max_history = 2;
        let provider = Arc::new(HashEmbeddingProvider::new(256).unwrap());
        Engine::in_memory(config, provider).unwrap()
    }

    #[test]
    fn test_answer_records_turns() {
        let engine = engine();
        engine
            .ingest(
                "horarios.md",
                "La biblioteca abre de 8 a 20 horas.",
                Partition::General,
            )
            .unwrap();
        let generator = RecordingGenerator::default();

        for q in ["horario biblioteca", "¿abre sábados?", "¿y domingos?"] {
            engine.answer(q, &generator, "web-1").unwrap();
        }

        let history = engine.history("web-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].user_text, "¿abre sábados?");
        assert_eq!(history[1].assistant_text, "answer (docs_only)");
        assert_eq!(generator.calls.lock().unwrap().len(), 3);

        let last = engine.last_turn("web-1").unwrap().unwrap();
        assert_eq!(last.user_text, "¿y domingos?");
    }

    #[test]
    fn test_exact_faq_text_is_strong_match() {
        let engine = engine();
        let faq = "¿Cuándo se paga la matrícula? Durante la primera semana de marzo.";
        engine.ingest("matricula.md", faq, Partition::Faq).unwrap();
        let generator = RecordingGenerator::default();

        let answer = engine.answer(faq, &generator, "s").unwrap();
        assert_eq!(answer.decision.tier, Tier::FaqStrong);

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls[0], (1, 0.1, "faq_only".to_string()));
    }

    #[test]
    fn test_generation_failure_propagates() {
        let engine = engine();
        let err = engine.answer("hola", &FailingGenerator, "s").unwrap_err();
        assert!(matches!(err, RagtierError::Generation(_)));
        assert!(engine.history("s").unwrap().is_empty());
        assert!(engine.last_turn("s").unwrap().is_none());
    }
}
