//! Per-partition vector index for similarity search
//!
//! Small partitions are scanned exhaustively; larger ones go through an HNSW
//! graph. Both paths rank by cosine similarity (`1 - cosine_distance`) and
//! break ties by insertion order, earliest first.
//!
//! `hnsw_rs` cannot remove points, so replaced and deleted documents leave a
//! stale slot behind that is filtered out of results. The graph is rebuilt
//! from live documents once stale slots pile up.
use super::{cosine_similarity, Document, IndexConfig, MatchResult, Partition};
use crate::error::{RagtierError, Result};
use crate::storage::{Database, IndexMeta};
use ahash::AHashMap;
use hnsw_rs::prelude::*;
use std::cmp::Ordering;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Maximum number of HNSW layers
const MAX_LAYER: usize = 16;

/// Rebuild once at least this many slots are stale...
const MIN_STALE_FOR_REBUILD: usize = 32;

/// ...and they make up more than this fraction of all slots
const STALE_REBUILD_RATIO: f32 = 0.10;

/// The only metric this index supports
pub const METRIC: &str = "cosine";

fn new_graph(config: &IndexConfig) -> Hnsw<'static, f32, DistCosine> {
    Hnsw::<f32, DistCosine>::new(
        config.hnsw_m,
        config.max_elements,
        MAX_LAYER,
        config.hnsw_ef_construction,
        DistCosine,
    )
}

struct IndexState {
    graph: Hnsw<'static, f32, DistCosine>,
    /// Slot number is the HNSW data id and the insertion sequence
    slots: Vec<Option<Arc<Document>>>,
    by_id: AHashMap<String, usize>,
    stale: usize,
}

impl IndexState {
    fn empty(config: &IndexConfig) -> Self {
        Self {
            graph: new_graph(config),
            slots: Vec::new(),
            by_id: AHashMap::new(),
            stale: 0,
        }
    }

    fn push(&mut self, doc: Arc<Document>) {
        let slot = self.slots.len();
        self.graph.insert((doc.vector.as_slice(), slot));
        self.by_id.insert(doc.id.clone(), slot);
        self.slots.push(Some(doc));
    }

    fn remove(&mut self, id: &str) -> bool {
        match self.by_id.remove(id) {
            Some(slot) => {
                self.slots[slot] = None;
                self.stale += 1;
                true
            }
            None => false,
        }
    }

    fn needs_rebuild(&self) -> bool {
        self.stale >= MIN_STALE_FOR_REBUILD
            && self.stale as f32 > self.slots.len() as f32 * STALE_REBUILD_RATIO
    }

    /// Re-insert live documents into a fresh graph, keeping their order
    fn rebuild(&mut self, config: &IndexConfig) {
        let live: Vec<Arc<Document>> = self.slots.drain(..).flatten().collect();
        *self = Self::empty(config);
        for doc in live {
            self.push(doc);
        }
    }

    fn live(&self) -> usize {
        self.by_id.len()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Nearest-neighbor store for one partition
pub struct VectorIndex {
    partition: Partition,
    dimension: usize,
    config: IndexConfig,
    /// Model stamped on every document written through this index
    model: String,
    store: Option<Arc<Database>>,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Create an empty index that lives only in memory
    pub fn in_memory(partition: Partition, dimension: usize, config: IndexConfig) -> Self {
        Self {
            partition,
            dimension,
            state: RwLock::new(IndexState::empty(&config)),
            config,
            model: String::new(),
            store: None,
        }
    }

    /// Stamp documents written through this index with `model`
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Open an index backed by the document database, loading every stored
    /// document of the partition that was embedded with `model`.
    ///
    /// Fails with `DimensionMismatch` if the partition was created with a
    /// different dimension. After a model change with the same dimension,
    /// documents embedded by the previous model stay in the store but are
    /// not searchable; re-ingesting them embeds them again with `model`.
    pub fn open(
        partition: Partition,
        dimension: usize,
        config: IndexConfig,
        store: Arc<Database>,
        model: &str,
    ) -> Result<Self> {
        match store.meta(partition).map_err(upstream)? {
            Some(meta) if meta.dimension != dimension => {
                return Err(RagtierError::DimensionMismatch {
                    expected: meta.dimension,
                    actual: dimension,
                });
            }
            Some(meta) if meta.model != model => {
                info!(
                    "Partition {} switches model from {} to {}",
                    partition, meta.model, model
                );
                store.set_meta_model(partition, model).map_err(upstream)?;
            }
            Some(_) => {}
            None => store
                .record_meta(
                    partition,
                    &IndexMeta {
                        dimension,
                        metric: METRIC.to_string(),
                        model: model.to_string(),
                    },
                )
                .map_err(upstream)?,
        }

        let documents = store.load_partition(partition).map_err(upstream)?;

        let mut state = IndexState::empty(&config);
        let mut other_model = 0;
        for doc in documents {
            if doc.model != model {
                other_model += 1;
                continue;
            }
            if doc.vector.len() != dimension {
                return Err(RagtierError::DimensionMismatch {
                    expected: dimension,
                    actual: doc.vector.len(),
                });
            }
            state.push(Arc::new(doc));
        }

        if other_model > 0 {
            warn!(
                "{} {} documents were embedded with another model and are excluded until re-ingested",
                other_model, partition
            );
        }

        info!(
            "Opened {} index: {} documents ({}D, {})",
            partition,
            state.live(),
            dimension,
            METRIC
        );

        Ok(Self {
            partition,
            dimension,
            config,
            model: model.to_string(),
            store: Some(store),
            state: RwLock::new(state),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        // A reader cannot observe a half-applied write: mutations happen only
        // after the store write succeeded and never panic midway.
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>> {
        self.state.write().map_err(|_| {
            RagtierError::UpstreamUnavailable(format!("{} index lock poisoned", self.partition))
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagtierError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert or replace the document keyed by `source_name`, returning its id
    pub fn upsert(&self, source_name: &str, text: &str, vector: Vec<f32>) -> Result<String> {
        self.upsert_document(Document::new(source_name, text, vector, self.partition))
    }

    /// Insert or replace a prepared document, returning its id
    pub fn upsert_document(&self, mut doc: Document) -> Result<String> {
        self.check_dimension(&doc.vector)?;
        doc.partition = self.partition;
        doc.model.clone_from(&self.model);

        let mut state = self.write()?;

        if let Some(store) = &self.store {
            store.put_document(&doc).map_err(upstream)?;
        }

        let id = doc.id.clone();
        let replaced = state.remove(&id);
        state.push(Arc::new(doc));
        if state.needs_rebuild() {
            debug!("Rebuilding {} graph ({} stale slots)", self.partition, state.stale);
            state.rebuild(&self.config);
        }

        debug!(
            "Upserted {} into {} ({})",
            id,
            self.partition,
            if replaced { "replaced" } else { "new" }
        );

        Ok(id)
    }

    /// Search for the `k` most similar documents
    ///
    /// `k` is clamped to `count()`; an empty index yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<MatchResult>> {
        self.check_dimension(query)?;

        let state = self.read();
        let k = k.min(state.live());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = if state.live() <= self.config.flat_search_limit {
            state
                .slots
                .iter()
                .enumerate()
                .filter_map(|(slot, doc)| {
                    doc.as_ref()
                        .map(|d| (slot, 1.0 - cosine_distance(query, &d.vector)))
                })
                .collect()
        } else {
            // Over-fetch so stale slots don't eat into the k live results
            let request = (k + state.stale).min(state.slots.len());
            let ef = self.config.hnsw_ef_search.max(request);
            state
                .graph
                .search(query, request, ef)
                .into_iter()
                .filter(|n| matches!(state.slots.get(n.d_id), Some(Some(_))))
                .map(|n| (n.d_id, 1.0 - n.distance))
                .collect()
        };

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .filter_map(|(slot, similarity)| {
                state.slots[slot].as_ref().map(|doc| MatchResult {
                    document: Arc::clone(doc),
                    similarity,
                })
            })
            .collect())
    }

    /// Whether a document with this source name is indexed
    pub fn exists(&self, source_name: &str) -> bool {
        self.contains_id(&super::document_id(source_name))
    }

    /// Whether a document with this id is indexed
    pub fn contains_id(&self, id: &str) -> bool {
        self.read().by_id.contains_key(id)
    }

    /// Look up a document by source name
    pub fn get(&self, source_name: &str) -> Option<Arc<Document>> {
        let state = self.read();
        state
            .by_id
            .get(&super::document_id(source_name))
            .and_then(|slot| state.slots[*slot].clone())
    }

    /// Delete a document by id. Returns false if it was neither indexed nor
    /// stored.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.write()?;

        // The store may hold a row embedded by a previous model
        let stored = match &self.store {
            Some(store) => store.delete_document(self.partition, id).map_err(upstream)?,
            None => false,
        };

        let indexed = state.remove(id);
        if state.needs_rebuild() {
            state.rebuild(&self.config);
        }
        Ok(indexed || stored)
    }

    /// Ids of the document stored under `source_name` and of its chunks
    /// (`<id>#1`, `<id>#2`, ...)
    pub fn source_ids(&self, source_name: &str) -> Vec<String> {
        let source_id = super::document_id(source_name);
        let state = self.read();
        let mut ids: Vec<(usize, String)> = state
            .by_id
            .iter()
            .filter(|(id, _)| super::belongs_to_source(id, &source_id))
            .map(|(id, slot)| (*slot, id.clone()))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Delete a source and all of its chunks, returning how many documents
    /// were removed
    pub fn delete_source(&self, source_name: &str) -> Result<usize> {
        self.prune_source(source_name, &[])
    }

    /// Delete the documents of a source whose ids are not in `keep`,
    /// including rows left in the store by a previous model
    pub fn prune_source(&self, source_name: &str, keep: &[String]) -> Result<usize> {
        let mut ids = self.source_ids(source_name);
        if let Some(store) = &self.store {
            let source_id = super::document_id(source_name);
            for id in store.source_ids(self.partition, &source_id).map_err(upstream)? {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }

        let mut removed = 0;
        for id in &ids {
            if !keep.contains(id) && self.delete(id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Pruned {} documents of {} from {}", removed, source_name, self.partition);
        }
        Ok(removed)
    }

    /// Remove every document, keeping partition, dimension and metric
    pub fn delete_all(&self) -> Result<usize> {
        let mut state = self.write()?;

        if let Some(store) = &self.store {
            store.delete_partition(self.partition).map_err(upstream)?;
        }

        let removed = state.live();
        *state = IndexState::empty(&self.config);

        info!("Cleared {} index ({} documents)", self.partition, removed);
        Ok(removed)
    }

    /// Number of live documents
    pub fn count(&self) -> usize {
        self.read().live()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }
}

fn upstream(err: RagtierError) -> RagtierError {
    match err {
        RagtierError::UpstreamUnavailable(_) | RagtierError::DimensionMismatch { .. } => err,
        other => RagtierError::UpstreamUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(dim: usize, hot: &[(usize, f32)]) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        for (i, x) in hot {
            v[*i] = *x;
        }
        crate::embedding::normalize(&mut v);
        v
    }

    fn index(dim: usize) -> VectorIndex {
        VectorIndex::in_memory(Partition::General, dim, IndexConfig::default())
    }

    #[test]
    fn test_index_creation() {
        let index = index(8);
        assert_eq!(index.dimension(), 8);
        assert_eq!(index.count(), 0);
        assert!(index.is_empty());
        assert_eq!(index.partition(), Partition::General);
    }

    #[test]
    fn test_insert_and_search() {
        let index = index(8);
        index.upsert("x.md", "x", unit(8, &[(0, 1.0)])).unwrap();
        index.upsert("y.md", "y", unit(8, &[(1, 1.0)])).unwrap();
        index
            .upsert("xy.md", "mostly x", unit(8, &[(0, 0.9), (1, 0.1)]))
            .unwrap();

        let results = index.search(&unit(8, &[(0, 1.0)]), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.source_name, "x.md");
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
        assert_eq!(results[1].document.source_name, "xy.md");
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[test]
    fn test_k_clamped_and_empty() {
        let index = index(4);
        assert!(index.search(&unit(4, &[(0, 1.0)]), 5).unwrap().is_empty());

        index.upsert("a", "a", unit(4, &[(0, 1.0)])).unwrap();
        assert_eq!(index.search(&unit(4, &[(0, 1.0)]), 10).unwrap().len(), 1);
        assert!(index.search(&unit(4, &[(0, 1.0)]), 0).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_replaces() {
        let index = index(4);
        index.upsert("faq/a b.md", "old", unit(4, &[(0, 1.0)])).unwrap();
        let id = index.upsert("faq/a b.md", "new", unit(4, &[(1, 1.0)])).unwrap();

        assert_eq!(id, "faq_a_b.md");
        assert_eq!(index.count(), 1);
        assert!(index.exists("faq/a b.md"));
        assert_eq!(index.get("faq/a b.md").unwrap().text, "new");

        let results = index.search(&unit(4, &[(1, 1.0)]), 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.text, "new");
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let index = index(4);
        let v = unit(4, &[(2, 1.0)]);
        for name in ["first", "second", "third"] {
            index.upsert(name, name, v.clone()).unwrap();
        }

        let names: Vec<_> = index
            .search(&v, 3)
            .unwrap()
            .into_iter()
            .map(|m| m.document.source_name.clone())
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dimension_validation() {
        let index = index(8);
        let result = index.upsert("bad", "bad", vec![1.0; 4]);
        assert!(matches!(
            result,
            Err(RagtierError::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
        assert!(index.search(&[1.0; 3], 1).is_err());
        assert_eq!(index.count(), 0);
    }

    #[test]
    fn test_delete_and_delete_all() {
        let index = index(4);
        index.upsert("a", "a", unit(4, &[(0, 1.0)])).unwrap();
        index.upsert("b", "b", unit(4, &[(1, 1.0)])).unwrap();

        assert!(index.delete("a").unwrap());
        assert!(!index.delete("a").unwrap());
        assert!(!index.exists("a"));
        assert_eq!(index.count(), 1);

        let results = index.search(&unit(4, &[(0, 1.0)]), 5).unwrap();
        assert!(results.iter().all(|m| m.document.id != "a"));

        assert_eq!(index.delete_all().unwrap(), 1);
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 4);

        index.upsert("c", "c", unit(4, &[(3, 1.0)])).unwrap();
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn test_graph_search_path() {
        let config = IndexConfig {
            flat_search_limit: 0,
            ..IndexConfig::default()
        };
        let index = VectorIndex::in_memory(Partition::Faq, 8, config);
        for i in 0..8 {
            index
                .upsert(&format!("doc{}", i), "t", unit(8, &[(i, 1.0)]))
                .unwrap();
        }

        let results = index.search(&unit(8, &[(3, 1.0)]), 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.source_name, "doc3");
        assert!(results[0].similarity > 0.99);
    }

    #[test]
    fn test_graph_search_skips_deleted_and_replaced() {
        let config = IndexConfig {
            flat_search_limit: 0,
            ..IndexConfig::default()
        };
        let index = VectorIndex::in_memory(Partition::General, 4, config);
        for i in 0..40 {
            let v = unit(4, &[(0, 1.0), (1, i as f32 / 40.0)]);
            index.upsert(&format!("doc{}", i), "t", v).unwrap();
        }
        // The documents closest to the query are the ones removed
        for i in 0..20 {
            assert!(index.delete(&format!("doc{}", i)).unwrap());
        }
        for i in 20..25 {
            let v = unit(4, &[(0, 1.0), (1, i as f32 / 40.0)]);
            index.upsert(&format!("doc{}", i), "replaced", v).unwrap();
        }
        assert_eq!(index.count(), 20);
        assert!(index.read().stale < MIN_STALE_FOR_REBUILD);

        let results = index.search(&unit(4, &[(0, 1.0)]), 10).unwrap();
        assert_eq!(results.len(), 10);
        for m in &results {
            let n: usize = m.document.source_name["doc".len()..].parse().unwrap();
            assert!(n >= 20, "deleted {} returned", m.document.source_name);
        }
        assert_eq!(results[0].document.source_name, "doc20");
        assert_eq!(results[0].document.text, "replaced");
    }

    #[test]
    fn test_index_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VectorIndex>();
    }

    #[test]
    fn test_delete_source_removes_chunks() {
        let index = index(4);
        for name in ["largo.md#1", "largo.md#2", "largo.md#3", "largo.md.bak", "corto.md"] {
            index.upsert(name, name, unit(4, &[(0, 1.0)])).unwrap();
        }

        assert_eq!(
            index.source_ids("largo.md"),
            vec!["largo.md#1", "largo.md#2", "largo.md#3"]
        );
        let keep = vec!["largo.md#1".to_string()];
        assert_eq!(index.prune_source("largo.md", &keep).unwrap(), 2);
        assert_eq!(index.source_ids("largo.md"), keep);

        assert_eq!(index.delete_source("largo.md").unwrap(), 1);
        assert_eq!(index.count(), 2);
        assert!(index.exists("largo.md.bak"));
        assert_eq!(index.delete_source("largo.md").unwrap(), 0);
    }

    #[test]
    fn test_stale_slots_trigger_rebuild() {
        let index = index(4);
        for round in 0..40 {
            index
                .upsert("same", &format!("v{}", round), unit(4, &[(round % 4, 1.0)]))
                .unwrap();
        }
        assert_eq!(index.count(), 1);
        assert!(index.read().slots.len() < 40);
        assert_eq!(index.get("same").unwrap().text, "v39");
    }

    #[test]
    fn test_open_persists_and_reloads() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(Database::new(&temp.path().join("db.sqlite")).unwrap());

        {
            let index = VectorIndex::open(
                Partition::Faq,
                4,
                IndexConfig::default(),
                store.clone(),
                "test-model",
            )
            .unwrap();
            index.upsert("a", "alpha", unit(4, &[(0, 1.0)])).unwrap();
            index.upsert("b", "beta", unit(4, &[(1, 1.0)])).unwrap();
            index.delete("b").unwrap();
        }

        let index = VectorIndex::open(
            Partition::Faq,
            4,
            IndexConfig::default(),
            store.clone(),
            "test-model",
        )
        .unwrap();
        assert_eq!(index.count(), 1);
        assert_eq!(index.get("a").unwrap().text, "alpha");

        let wrong = VectorIndex::open(Partition::Faq, 8, IndexConfig::default(), store, "test-model");
        assert!(matches!(wrong, Err(RagtierError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_model_change_hides_old_vectors() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(Database::new(&temp.path().join("db.sqlite")).unwrap());
        let open = |model: &str| {
            VectorIndex::open(
                Partition::General,
                4,
                IndexConfig::default(),
                store.clone(),
                model,
            )
            .unwrap()
        };

        let old = open("modelo-a");
        old.upsert("a", "alpha", unit(4, &[(0, 1.0)])).unwrap();
        old.upsert("b", "beta", unit(4, &[(1, 1.0)])).unwrap();
        drop(old);

        let new = open("modelo-b");
        assert_eq!(new.count(), 0);
        assert!(new.search(&unit(4, &[(0, 1.0)]), 5).unwrap().is_empty());
        assert_eq!(store.meta(Partition::General).unwrap().unwrap().model, "modelo-b");

        new.upsert("a", "alpha", unit(4, &[(2, 1.0)])).unwrap();
        assert_eq!(new.get("a").unwrap().model, "modelo-b");
        // Rows left from the old model are still removable
        assert!(new.delete("b").unwrap());
        drop(new);

        let reopened = open("modelo-b");
        assert_eq!(reopened.count(), 1);
        assert_eq!(store.load_partition(Partition::General).unwrap().len(), 1);
        assert_eq!(open("modelo-a").count(), 0);
    }
}
