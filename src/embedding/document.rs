//! Indexed document model and identity rules

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Logical subset of the index, searched independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Curated question/answer entries
    Faq,
    /// Everything else (regulations, guides, announcements)
    General,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Faq => "faq",
            Partition::General => "general",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "faq" => Ok(Partition::Faq),
            "general" | "docs" => Ok(Partition::General),
            other => Err(format!("Unknown partition: {}", other)),
        }
    }
}

/// Derive the document id from a source name.
///
/// Spaces and path separators become underscores, so the id is stable across
/// runs and re-ingesting a source overwrites the previous entry.
pub fn document_id(source_name: &str) -> String {
    source_name
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// BLAKE3 fingerprint of document text
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// A stored document with its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub source_name: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub partition: Partition,
    pub content_hash: String,
    /// Embedding model that produced `vector`; empty until indexed
    pub model: String,
}

impl Document {
    pub fn new(
        source_name: impl Into<String>,
        text: impl Into<String>,
        vector: Vec<f32>,
        partition: Partition,
    ) -> Self {
        let source_name = source_name.into();
        let text = text.into();
        Self {
            id: document_id(&source_name),
            content_hash: content_hash(&text),
            source_name,
            text,
            vector,
            partition,
            model: String::new(),
        }
    }
}

/// Whether `id` names the source `source_id` itself or one of its chunks
/// (`<source_id>#<n>`)
pub fn belongs_to_source(id: &str, source_id: &str) -> bool {
    match id.strip_prefix(source_id) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('#')
            .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false),
        None => false,
    }
}

/// One ranked search hit
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub document: Arc<Document>,
    /// `1 - cosine_distance`, in [0, 1] for normalized embeddings
    pub similarity: f32,
}
