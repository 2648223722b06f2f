//! Retrieval and context tiering
//!
//! `Retriever` turns a query into ranked passages from one partition;
//! `ContextClassifier` combines FAQ and general retrieval into a single
//! tier decision per query.

mod classifier;
mod retriever;

pub use classifier::{ContextClassifier, ContextDecision, Tier};
pub use retriever::Retriever;

use crate::embedding::MatchResult;
use serde::{Deserialize, Serialize};

/// A ranked passage as handed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub source_name: String,
    pub text: String,
    /// Similarity as reported by the index
    pub similarity: f32,
}

impl From<&MatchResult> for RetrievedPassage {
    fn from(m: &MatchResult) -> Self {
        Self {
            source_name: m.document.source_name.clone(),
            text: m.document.text.clone(),
            similarity: m.similarity,
        }
    }
}

impl RetrievedPassage {
    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            self.text.clone()
        } else {
            let head: String = self.text.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }
}
