//! Approximate nearest-neighbour index over note embeddings (HNSW)
//!
//! The index is derived state: the note store holds every embedding and the
//! index is rebuilt from it on cold start. It moves from `Uninitialized` to
//! `Initialized` exactly once, when the dimensionality becomes known.
//!
//! HNSW graphs cannot remove points. Every upsert therefore claims a fresh
//! internal slot; the previous slot of that note (or the slot of a deleted
//! note) stays in the graph as a tombstone and is skipped at query time.
//! Memory only grows: `slot_count() >= size()`.

use std::collections::HashMap;

use hnsw_rs::prelude::*;

use crate::core::config::IndexConfig;
use crate::core::note::NoteId;
use crate::error::{BrainError, Result};

/// hnsw_rs caps the layer count at 16
const MAX_LAYERS: usize = 16;

pub struct VectorIndex {
    config: IndexConfig,
    state: IndexState,
}

enum IndexState {
    Uninitialized,
    Initialized(Graph),
}

struct Graph {
    dim: usize,
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// Live slot for each note
    slots: HashMap<NoteId, usize>,
    /// Note that claimed each slot, live or not
    owners: Vec<NoteId>,
}

impl Graph {
    fn new(dim: usize, config: &IndexConfig) -> Self {
        let hnsw = Hnsw::new(
            config.max_connections,
            config.max_elements,
            MAX_LAYERS,
            config.ef_construction,
            DistCosine {},
        );
        Self {
            dim,
            hnsw,
            slots: HashMap::new(),
            owners: Vec::new(),
        }
    }

    fn check_dim(&self, len: usize) -> Result<()> {
        if len != self.dim {
            return Err(BrainError::DimensionMismatch {
                expected: self.dim,
                actual: len,
            });
        }
        Ok(())
    }

    fn insert(&mut self, id: NoteId, vector: &[f32]) {
        let slot = self.owners.len();
        self.hnsw.insert_slice((vector, slot));
        self.owners.push(id);
        self.slots.insert(id, slot);
    }

    fn is_live(&self, slot: usize) -> Option<NoteId> {
        let owner = *self.owners.get(slot)?;
        (self.slots.get(&owner) == Some(&slot)).then_some(owner)
    }
}

impl VectorIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            state: IndexState::Uninitialized,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, IndexState::Initialized(_))
    }

    pub fn dimension(&self) -> Option<usize> {
        match &self.state {
            IndexState::Uninitialized => None,
            IndexState::Initialized(graph) => Some(graph.dim),
        }
    }

    /// Fix the dimensionality and bulk-load existing embeddings.
    ///
    /// Rows whose length differs from `dim` are skipped and counted. Calling
    /// this on an initialized index with the same `dim` is a no-op; a
    /// different `dim` is a `DimensionMismatch`.
    pub fn initialize<I>(&mut self, dim: usize, rows: I) -> Result<LoadReport>
    where
        I: IntoIterator<Item = (NoteId, Vec<f32>)>,
    {
        if dim == 0 {
            return Err(BrainError::Validation("vector dimension must be positive".into()));
        }
        if let IndexState::Initialized(graph) = &self.state {
            graph.check_dim(dim)?;
            return Ok(LoadReport::default());
        }

        let mut graph = Graph::new(dim, &self.config);
        let mut report = LoadReport::default();
        for (id, vector) in rows {
            if vector.len() == dim {
                graph.insert(id, &vector);
                report.loaded += 1;
            } else {
                tracing::warn!(note_id = id, len = vector.len(), dim, "Skipping embedding with wrong dimension");
                report.skipped += 1;
            }
        }

        tracing::info!(dim, loaded = report.loaded, skipped = report.skipped, "Vector index initialized");
        self.state = IndexState::Initialized(graph);
        Ok(report)
    }

    /// Insert or replace the vector for `id`.
    ///
    /// On an uninitialized index the vector's length fixes the dimension.
    pub fn upsert(&mut self, id: NoteId, vector: &[f32]) -> Result<()> {
        if !self.is_initialized() {
            self.initialize(vector.len(), std::iter::empty())?;
        }
        match &mut self.state {
            IndexState::Initialized(graph) => {
                graph.check_dim(vector.len())?;
                graph.insert(id, vector);
                Ok(())
            }
            IndexState::Uninitialized => Err(BrainError::IndexInconsistency(
                "vector index did not initialize".into(),
            )),
        }
    }

    /// Logically delete `id`. Returns whether it was live.
    pub fn tombstone(&mut self, id: NoteId) -> bool {
        match &mut self.state {
            IndexState::Uninitialized => false,
            IndexState::Initialized(graph) => graph.slots.remove(&id).is_some(),
        }
    }

    #[cfg(test)]
    fn contains(&self, id: NoteId) -> bool {
        match &self.state {
            IndexState::Uninitialized => false,
            IndexState::Initialized(graph) => graph.slots.contains_key(&id),
        }
    }

    /// Live items
    pub fn size(&self) -> usize {
        match &self.state {
            IndexState::Uninitialized => 0,
            IndexState::Initialized(graph) => graph.slots.len(),
        }
    }

    /// Graph slots including tombstones
    pub fn slot_count(&self) -> usize {
        match &self.state {
            IndexState::Uninitialized => 0,
            IndexState::Initialized(graph) => graph.owners.len(),
        }
    }

    /// Up to `k` live neighbours of `query` with cosine similarity, best first.
    ///
    /// `k` is clamped to `size()`; an empty or uninitialized index yields
    /// an empty result.
    pub fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(NoteId, f32)>> {
        let IndexState::Initialized(graph) = &self.state else {
            return Ok(Vec::new());
        };
        graph.check_dim(query.len())?;

        let k = k.min(graph.slots.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        // Tombstoned slots still occupy neighbour positions; over-fetch by their count.
        let dead = graph.owners.len() - graph.slots.len();
        let fetch = (k + dead).min(graph.owners.len());
        let ef = self.config.ef_search.max(fetch);

        let mut hits: Vec<(NoteId, f32)> = graph
            .hnsw
            .search(query, fetch, ef)
            .into_iter()
            .filter_map(|n| graph.is_live(n.d_id).map(|id| (id, 1.0 - n.distance)))
            .collect();

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Outcome of a bulk load
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> VectorIndex {
        VectorIndex::new(IndexConfig {
            max_connections: 8,
            max_elements: 1_000,
            ef_construction: 50,
            ef_search: 50,
        })
    }

    #[test]
    fn test_uninitialized_knn_is_empty() -> Result<()> {
        let idx = index();
        assert!(!idx.is_initialized());
        assert!(idx.knn(&[1.0, 0.0], 5)?.is_empty());
        assert_eq!(idx.size(), 0);
        Ok(())
    }

    #[test]
    fn test_first_upsert_fixes_dimension() -> Result<()> {
        let mut idx = index();
        idx.upsert(1, &[1.0, 0.0, 0.0])?;

        assert_eq!(idx.dimension(), Some(3));
        assert_eq!(idx.size(), 1);

        let err = idx.upsert(2, &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, BrainError::DimensionMismatch { expected: 3, actual: 2 }));
        assert_eq!(idx.size(), 1);
        assert!(matches!(
            idx.knn(&[1.0; 4], 1),
            Err(BrainError::DimensionMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_knn_orders_by_similarity_and_clamps() -> Result<()> {
        let mut idx = index();
        idx.upsert(10, &[1.0, 0.0, 0.0])?;
        idx.upsert(20, &[0.7, 0.7, 0.0])?;
        idx.upsert(30, &[0.0, 0.0, 1.0])?;

        let hits = idx.knn(&[1.0, 0.1, 0.0], 10)?;
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 10);
        assert_eq!(hits[1].0, 20);
        assert!(hits[0].1 > hits[1].1 && hits[1].1 > hits[2].1);
        Ok(())
    }

    #[test]
    fn test_tombstone_hides_and_reinsert_revives() -> Result<()> {
        let mut idx = index();
        idx.upsert(1, &[1.0, 0.0])?;
        idx.upsert(2, &[0.0, 1.0])?;

        assert!(idx.tombstone(1));
        assert!(!idx.tombstone(1));
        assert_eq!(idx.size(), 1);
        assert_eq!(idx.slot_count(), 2);

        let hits = idx.knn(&[1.0, 0.0], 5)?;
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![2]);

        idx.upsert(1, &[1.0, 0.05])?;
        assert_eq!(idx.size(), 2);
        assert_eq!(idx.slot_count(), 3);
        assert_eq!(idx.knn(&[1.0, 0.0], 1)?[0].0, 1);
        Ok(())
    }

    #[test]
    fn test_upsert_replaces_vector() -> Result<()> {
        let mut idx = index();
        idx.upsert(1, &[1.0, 0.0])?;
        idx.upsert(2, &[0.6, 0.8])?;
        idx.upsert(1, &[0.0, 1.0])?;

        assert_eq!(idx.size(), 2);
        let hits = idx.knn(&[0.0, 1.0], 2)?;
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits.len(), 2);
        Ok(())
    }

    #[test]
    fn test_initialize_bulk_load_skips_bad_rows() -> Result<()> {
        let mut idx = index();
        let report = idx.initialize(
            2,
            vec![(1, vec![1.0, 0.0]), (2, vec![1.0, 0.0, 0.0]), (3, vec![0.0, 1.0])],
        )?;

        assert_eq!(report, LoadReport { loaded: 2, skipped: 1 });
        assert_eq!(idx.size(), 2);
        assert!(!idx.contains(2));

        assert_eq!(idx.initialize(2, Vec::new())?, LoadReport::default());
        assert!(idx.initialize(5, Vec::new()).is_err());
        Ok(())
    }

    #[test]
    fn test_all_tombstoned_is_empty() -> Result<()> {
        let mut idx = index();
        idx.upsert(1, &[1.0, 0.0])?;
        idx.tombstone(1);
        assert!(idx.knn(&[1.0, 0.0], 3)?.is_empty());
        Ok(())
    }
}
