//! Bounded memoization for embeddings and ranked query results
//!
//! Both caches are `moka` caches with a fixed entry capacity. Failures are
//! never cached: a backend error simply leaves the entry absent.
//!
//! Query results are keyed by the store generation observed when the query
//! ran. Every mutation through the engine bumps the generation and clears
//! the query cache, so a result computed before an edit is never served
//! after it. Writes from another process sharing the same database file do
//! not bump the generation and can therefore leave stale answers in the
//! cache until the process restarts.

use std::sync::Arc;

use moka::sync::Cache;

use super::embedding::{check_embedding, EmbeddingBackend};
use crate::core::note::{to_micros, NoteId, Scope};
use crate::error::Result;

/// Memoizing front for the embedding backend, keyed by normalized text
pub struct EmbeddingCache {
    backend: Arc<dyn EmbeddingBackend>,
    inner: Cache<String, Arc<Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, capacity: u64) -> Self {
        Self {
            backend,
            inner: Cache::builder().max_capacity(capacity).build(),
        }
    }

    pub fn embed(&self, normalized: &str) -> Result<Arc<Vec<f32>>> {
        if let Some(hit) = self.inner.get(normalized) {
            tracing::trace!(len = normalized.len(), "Embedding cache HIT");
            return Ok(hit);
        }

        let vector = Arc::new(check_embedding(self.backend.embed(normalized)?)?);
        self.inner.insert(normalized.to_string(), Arc::clone(&vector));
        Ok(vector)
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

/// Cache key for a ranked query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    query: String,
    k: usize,
    tags: Vec<String>,
    start: Option<i64>,
    end: Option<i64>,
    generation: u64,
}

impl QueryKey {
    pub fn new(normalized_query: &str, k: usize, scope: &Scope, generation: u64) -> Self {
        Self {
            query: normalized_query.to_string(),
            k,
            tags: scope.tags.clone(),
            start: scope.range.start.map(to_micros),
            end: scope.range.end.map(to_micros),
            generation,
        }
    }
}

/// Cached hit: id, body, fused score
pub type CachedHits = Arc<Vec<(NoteId, String, f32)>>;

pub struct QueryCache {
    inner: Cache<QueryKey, CachedHits>,
}

impl QueryCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::builder().max_capacity(capacity).build(),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<CachedHits> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: QueryKey, hits: CachedHits) {
        self.inner.insert(key, hits);
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}
