//! Single-partition retrieval: fixed top-k and threshold-filtered

use super::RetrievedPassage;
use crate::embedding::{EmbeddingProvider, MatchResult, VectorIndex};
use crate::error::Result;
use std::sync::Arc;
use tracing::debug;

/// Default over-fetch factor for threshold retrieval
pub const DEFAULT_OVER_FETCH: usize = 2;

/// Embeds queries and searches one partition.
///
/// Similarities always come from the index; the retriever never re-scores or
/// re-orders what the index returns.
#[derive(Clone)]
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    over_fetch_factor: usize,
}

impl Retriever {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index: Arc<VectorIndex>) -> Self {
        Self {
            provider,
            index,
            over_fetch_factor: DEFAULT_OVER_FETCH,
        }
    }

    /// Candidates fetched per wanted result before threshold filtering
    pub fn with_over_fetch(mut self, factor: usize) -> Self {
        self.over_fetch_factor = factor.max(1);
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Embed a query; embedding errors propagate unchanged
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        Ok(self.provider.embed(query)?)
    }

    /// Top `k` passages for a query, most similar first
    pub fn retrieve_top_k(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embed_query(query)?;
        let matches = self.retrieve_top_k_with_vector(&vector, k)?;
        Ok(matches.iter().map(RetrievedPassage::from).collect())
    }

    /// Passages with `similarity >= min_similarity`, at most `max_results`.
    /// An empty index answers without embedding the query.
    pub fn retrieve_with_threshold(
        &self,
        query: &str,
        min_similarity: f32,
        max_results: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        if max_results == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embed_query(query)?;
        let matches =
            self.retrieve_with_threshold_with_vector(&vector, min_similarity, max_results)?;
        Ok(matches.iter().map(RetrievedPassage::from).collect())
    }

    /// Top-k search with an already embedded query
    pub fn retrieve_top_k_with_vector(&self, vector: &[f32], k: usize) -> Result<Vec<MatchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let matches = self.index.search(vector, k)?;
        debug!(
            "{} top-{}: {} results",
            self.index.partition(),
            k,
            matches.len()
        );
        Ok(matches)
    }

    /// Threshold search with an already embedded query
    pub fn retrieve_with_threshold_with_vector(
        &self,
        vector: &[f32],
        min_similarity: f32,
        max_results: usize,
    ) -> Result<Vec<MatchResult>> {
        let initial_k = max_results
            .saturating_mul(self.over_fetch_factor)
            .min(self.index.count());
        if max_results == 0 || initial_k == 0 {
            return Ok(Vec::new());
        }

        let mut matches: Vec<MatchResult> = self
            .index
            .search(vector, initial_k)?
            .into_iter()
            .filter(|m| m.similarity >= min_similarity)
            .collect();
        matches.truncate(max_results);

        debug!(
            "{} threshold {:.2}: {} of {} candidates kept",
            self.index.partition(),
            min_similarity,
            matches.len(),
            initial_k
        );
        Ok(matches)
    }
}
