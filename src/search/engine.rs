//! Hybrid retrieval engine
//!
//! [`Brain`] is the shared half: configuration, the vector index behind a
//! `RwLock`, both caches and the store generation. It is cheap to clone and
//! can be handed to any number of workers. Each worker opens a [`Session`],
//! which owns its own SQLite connection.
//!
//! Writes embed first, with no lock held, then take the index write lock
//! for the store transaction, the commit and the vector update. Queries
//! hold the read lock from the vector search through materialization, so
//! a query never observes half of a write.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::backend::OllamaBackend;
use super::cache::{EmbeddingCache, QueryCache, QueryKey};
use super::embedding::{EmbeddingBackend, GenerationBackend, HarmonicEmbedder};
use super::fusion::fuse;
use super::store::{ExportedNote, NewNote, NoteStore, StoreStats};
use super::vector::{LoadReport, VectorIndex};
use crate::core::chunker;
use crate::core::config::{BackendKind, Config};
use crate::core::normalize::normalize;
use crate::core::note::{split_tags, Note, NoteFilter, NoteId, Scope};
use crate::core::paths::StorePaths;
use crate::error::{BrainError, Result};

/// Answer returned by `ask` when retrieval finds nothing
pub const NO_CONTEXT_ANSWER: &str = "No notes available";

/// Scoped vector candidates are oversampled by this factor before filtering
const SCOPE_OVERSAMPLE: usize = 4;

/// Shared engine handle
#[derive(Clone)]
pub struct Brain {
    shared: Arc<Shared>,
}

struct Shared {
    config: Config,
    db_path: PathBuf,
    index: RwLock<VectorIndex>,
    embeddings: EmbeddingCache,
    queries: QueryCache,
    generation: AtomicU64,
    generator: Option<Arc<dyn GenerationBackend>>,
}

/// Outcome of writing one note
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteReport {
    pub id: NoteId,
    pub parent_id: Option<NoteId>,
    pub embedded: bool,
    /// Why the note was saved without an embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub id: NoteId,
    pub body: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub hits: Vec<Hit>,
    /// Set when the vector side failed and only lexical ranking was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl SearchResults {
    pub fn ids(&self) -> Vec<NoteId> {
        self.hits.iter().map(|h| h.id).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub context: Vec<Hit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrainStats {
    #[serde(flatten)]
    pub store: StoreStats,
    pub live_vectors: usize,
    pub vector_slots: usize,
    pub cached_embeddings: u64,
    pub cached_queries: u64,
    pub db_bytes: u64,
    pub db_path: PathBuf,
}

/// Result of embedding notes that were stored without a vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbedReport {
    pub embedded: usize,
    pub failed: usize,
    /// Edited or deleted by another writer while the embedding was computed
    pub skipped: usize,
}

impl Brain {
    /// Open the store under `paths` with backends chosen by `config.backend`.
    pub fn open(paths: &StorePaths, config: Config) -> Result<Self> {
        paths.ensure()?;

        let (embedder, generator): (Arc<dyn EmbeddingBackend>, Option<Arc<dyn GenerationBackend>>) =
            match config.backend.kind {
                BackendKind::Ollama => {
                    let backend = Arc::new(OllamaBackend::new(&config.backend)?);
                    (
                        backend.clone() as Arc<dyn EmbeddingBackend>,
                        Some(backend as Arc<dyn GenerationBackend>),
                    )
                }
                BackendKind::Harmonic => (Arc::new(HarmonicEmbedder::new()) as Arc<dyn EmbeddingBackend>, None),
            };

        Self::open_with(&paths.db, config, embedder, generator)
    }

    /// Open with explicit backends.
    ///
    /// Repairs lexical divergence and bulk-loads stored embeddings into the
    /// vector index when the dimensionality is already recorded.
    pub fn open_with(
        db_path: &Path,
        config: Config,
        embedder: Arc<dyn EmbeddingBackend>,
        generator: Option<Arc<dyn GenerationBackend>>,
    ) -> Result<Self> {
        config.validate()?;
        let store = NoteStore::open(db_path)?;
        repair_lexical(&store)?;

        let mut index = VectorIndex::new(config.index.clone());
        if let Some(dim) = store.dimension()? {
            index.initialize(dim, store.embedded_rows()?)?;
        }

        tracing::info!(
            db = %db_path.display(),
            vectors = index.size(),
            backend = ?config.backend.kind,
            "Brain opened"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                embeddings: EmbeddingCache::new(embedder, config.cache.embeddings),
                queries: QueryCache::new(config.cache.queries),
                config,
                db_path: db_path.to_path_buf(),
                index: RwLock::new(index),
                generation: AtomicU64::new(0),
                generator,
            }),
        })
    }

    /// New worker session with its own database connection
    pub fn session(&self) -> Result<Session> {
        let store = NoteStore::open(&self.shared.db_path)?;
        repair_lexical(&store)?;
        Ok(Session {
            brain: self.clone(),
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn db_path(&self) -> &Path {
        &self.shared.db_path
    }

    /// Current store generation; advances on every mutation.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Called with the index write lock held.
    fn bump_generation(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.queries.clear();
    }
}

fn repair_lexical(store: &NoteStore) -> Result<()> {
    let lexical = store.lexical();
    let divergence = lexical.divergence()?;
    if divergence == 0 {
        return Ok(());
    }

    tracing::warn!(divergence, "Lexical index out of sync, rebuilding");
    let tx = store.begin()?;
    let count = lexical.rebuild()?;
    tx.commit()?;
    tracing::info!(count, "Lexical index rebuilt");
    Ok(())
}

/// One worker's view of the engine
pub struct Session {
    brain: Brain,
    store: NoteStore,
}

impl Session {
    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    pub fn db_path(&self) -> &Path {
        self.brain.db_path()
    }

    /// Add `body`, chunked at `chunking.max_words`. Returns one outcome per chunk.
    ///
    /// The first stored chunk becomes the parent of the rest. A failing
    /// chunk is reported in place and does not stop the others.
    pub fn add(&self, body: &str, tags: &str) -> Result<Vec<Result<WriteReport>>> {
        self.add_at(body, tags, Utc::now())
    }

    pub fn add_at(
        &self,
        body: &str,
        tags: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<Result<WriteReport>>> {
        if body.trim().is_empty() {
            return Err(BrainError::Validation("note body is empty".into()));
        }
        let tags = split_tags(tags);

        let mut parent: Option<NoteId> = None;
        let mut outcomes = Vec::new();
        for (i, chunk) in chunker::split(body, self.brain.shared.config.chunking.max_words).enumerate() {
            let outcome = self.insert_one(&chunk, &tags, parent, timestamp);
            match &outcome {
                Ok(report) => {
                    parent.get_or_insert(report.id);
                }
                Err(err) => tracing::warn!(chunk = i, error = %err, "Chunk not stored"),
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn insert_one(
        &self,
        body: &str,
        tags: &[String],
        parent_id: Option<NoteId>,
        timestamp: DateTime<Utc>,
    ) -> Result<WriteReport> {
        let (vector, mut warning) = self.embed_body(body)?;

        let mut index = self.brain.shared.index.write();
        let vector = self.check_dimension(&index, vector, &mut warning)?;
        let note = NewNote {
            parent_id,
            body,
            tags: tags.to_vec(),
            timestamp,
            embedding: vector.as_deref().map(Vec::as_slice),
        };

        let tx = self.store.begin()?;
        let id = self.store.insert(&note)?;
        if let Some(v) = &vector {
            self.store.bind_dimension(v.len())?;
        }
        tx.commit()?;

        let embedded = match &vector {
            Some(v) => self.place_vector(&mut index, id, v, &mut warning),
            None => false,
        };
        self.brain.bump_generation();

        tracing::debug!(id, embedded, "Note stored");
        Ok(WriteReport {
            id,
            parent_id: note.parent_id,
            embedded,
            warning,
        })
    }

    /// Replace body and, when given, tags. The note is re-embedded and
    /// every index refreshed. Bodies are not re-chunked.
    pub fn update(&self, id: NoteId, body: &str, tags: Option<&str>) -> Result<WriteReport> {
        if body.trim().is_empty() {
            return Err(BrainError::Validation("note body is empty".into()));
        }
        self.rewrite(id, body, tags.map(split_tags), None)?
            .ok_or(BrainError::NotFound(id))
    }

    /// Store `body` for note `id`.
    ///
    /// The row is read again under the index write lock, so `None` tags keep
    /// whatever tags the note has at that point. With `seen`, the write only
    /// attaches a vector: it keeps the timestamp and returns `Ok(None)` when
    /// the note no longer matches the snapshot.
    fn rewrite(
        &self,
        id: NoteId,
        body: &str,
        tags: Option<Vec<String>>,
        seen: Option<&Note>,
    ) -> Result<Option<WriteReport>> {
        let (vector, mut warning) = self.embed_body(body)?;

        let mut index = self.brain.shared.index.write();
        let current = self.store.get(id)?.ok_or(BrainError::NotFound(id))?;
        if let Some(seen) = seen {
            if current.embedded || current.body != seen.body || current.timestamp != seen.timestamp {
                tracing::debug!(id, "Note changed while embedding, left as is");
                return Ok(None);
            }
        }
        let tags = tags.unwrap_or_else(|| current.tags.clone());
        let timestamp = if seen.is_some() { current.timestamp } else { Utc::now() };
        let vector = self.check_dimension(&index, vector, &mut warning)?;
        if seen.is_some() && vector.is_none() {
            return Ok(Some(WriteReport {
                id,
                parent_id: current.parent_id,
                embedded: false,
                warning,
            }));
        }

        let tx = self.store.begin()?;
        self.store.update(id, body, &tags, timestamp, vector.as_deref().map(Vec::as_slice))?;
        if let Some(v) = &vector {
            self.store.bind_dimension(v.len())?;
        }
        tx.commit()?;

        let embedded = match &vector {
            Some(v) => self.place_vector(&mut index, id, v, &mut warning),
            None => {
                index.tombstone(id);
                false
            }
        };
        self.brain.bump_generation();

        Ok(Some(WriteReport {
            id,
            parent_id: current.parent_id,
            embedded,
            warning,
        }))
    }

    /// Delete one note. Chunk children are left in place.
    pub fn delete(&self, id: NoteId) -> Result<bool> {
        let mut index = self.brain.shared.index.write();
        let removed = self.store.delete(id)?;
        if removed {
            index.tombstone(id);
            self.brain.bump_generation();
        }
        Ok(removed)
    }

    pub fn toggle_favorite(&self, id: NoteId) -> Result<bool> {
        let _index = self.brain.shared.index.write();
        let favorite = self.store.toggle_favorite(id)?;
        self.brain.bump_generation();
        Ok(favorite)
    }

    pub fn get(&self, id: NoteId) -> Result<Option<Note>> {
        self.store.get(id)
    }

    pub fn list(&self, filter: &NoteFilter, limit: Option<usize>) -> Result<Vec<Note>> {
        self.store.list(filter, limit)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<Note>> {
        self.store.recent(limit)
    }

    pub fn favorites(&self) -> Result<Vec<Note>> {
        self.store.favorites()
    }

    /// Embed normalized text. Empty text yields no vector and no warning;
    /// a backend failure yields no vector and a warning.
    fn embed_body(&self, body: &str) -> Result<(Option<Arc<Vec<f32>>>, Option<String>)> {
        let normalized = normalize(body);
        if normalized.is_empty() {
            return Ok((None, None));
        }
        match self.brain.shared.embeddings.embed(&normalized) {
            Ok(vector) => Ok((Some(vector), None)),
            Err(err) if err.is_backend() => {
                tracing::warn!(error = %err, "Embedding failed, storing note without vector");
                Ok((None, Some(err.to_string())))
            }
            Err(err) => Err(err),
        }
    }

    /// Drop a vector whose length disagrees with the bound dimension.
    fn check_dimension(
        &self,
        index: &VectorIndex,
        vector: Option<Arc<Vec<f32>>>,
        warning: &mut Option<String>,
    ) -> Result<Option<Arc<Vec<f32>>>> {
        let Some(v) = vector else {
            return Ok(None);
        };
        let bound = match index.dimension() {
            Some(dim) => Some(dim),
            None => self.store.dimension()?,
        };
        match bound {
            Some(expected) if expected != v.len() => {
                let err = BrainError::DimensionMismatch {
                    expected,
                    actual: v.len(),
                };
                tracing::warn!(error = %err, "Embedding rejected");
                *warning = Some(err.to_string());
                Ok(None)
            }
            _ => Ok(Some(v)),
        }
    }

    /// Put a committed vector into the index. The first vector of a store
    /// initializes the index from every stored embedding.
    fn place_vector(
        &self,
        index: &mut VectorIndex,
        id: NoteId,
        vector: &[f32],
        warning: &mut Option<String>,
    ) -> bool {
        let placed = if index.is_initialized() {
            index.upsert(id, vector)
        } else {
            self.store
                .embedded_rows()
                .and_then(|rows| index.initialize(vector.len(), rows))
                .map(|_| ())
        };
        match placed {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(id, error = %err, "Vector index update failed");
                *warning = Some(err.to_string());
                false
            }
        }
    }

    /// Top `k` notes for `query` within `scope`, fusing lexical and vector scores.
    ///
    /// An empty query browses the scoped notes newest first with score 0.
    /// If the vector side fails, ranking falls back to lexical only and the
    /// failure is reported in `degraded`.
    pub fn topk(&self, query: &str, k: usize, scope: &Scope) -> Result<SearchResults> {
        scope.range.validate()?;
        if k == 0 {
            return Ok(SearchResults::default());
        }

        let normalized = normalize(query);
        if normalized.is_empty() {
            let filter = NoteFilter {
                text: None,
                scope: scope.clone(),
            };
            let hits = self
                .store
                .list(&filter, Some(k))?
                .into_iter()
                .map(|n| Hit {
                    id: n.id,
                    body: n.body,
                    score: 0.0,
                })
                .collect();
            return Ok(SearchResults { hits, degraded: None });
        }

        let shared = &self.brain.shared;
        let searchable = {
            let index = shared.index.read();
            let key = QueryKey::new(&normalized, k, scope, self.brain.generation());
            if let Some(cached) = shared.queries.get(&key) {
                tracing::debug!(query = %normalized, k, "Query cache HIT");
                return Ok(SearchResults {
                    hits: cached
                        .iter()
                        .map(|(id, body, score)| Hit {
                            id: *id,
                            body: body.clone(),
                            score: *score,
                        })
                        .collect(),
                    degraded: None,
                });
            }
            index.size() > 0
        };

        let mut degraded = None;
        let query_vector = if searchable {
            match shared.embeddings.embed(&normalized) {
                Ok(v) => Some(v),
                Err(err) if err.is_backend() => {
                    tracing::warn!(error = %err, "Query embedding failed, lexical only");
                    degraded = Some(err.to_string());
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        let index = shared.index.read();
        let generation = self.brain.generation();
        let pool = if scope.is_empty() { k } else { k.saturating_mul(SCOPE_OVERSAMPLE) };

        let mut vector_hits = match &query_vector {
            Some(v) => match index.knn(v, pool) {
                Ok(hits) => hits,
                Err(err) if err.is_backend() => {
                    tracing::warn!(error = %err, "Vector search failed, lexical only");
                    degraded = Some(err.to_string());
                    Vec::new()
                }
                Err(err) => return Err(err),
            },
            None => Vec::new(),
        };
        let lexical_hits = self.store.lexical().search(&normalized, scope, pool)?;

        let mut ids: Vec<NoteId> = vector_hits.iter().chain(&lexical_hits).map(|h| h.0).collect();
        ids.sort_unstable();
        ids.dedup();
        let mut notes = self.store.get_many(&ids)?;

        vector_hits.retain(|(id, _)| match notes.get(id) {
            Some(note) => scope.matches(note),
            None => {
                tracing::warn!(id, "Vector hit has no stored note");
                false
            }
        });

        let hits: Vec<Hit> = fuse(&vector_hits, &lexical_hits)
            .into_iter()
            .filter_map(|(id, score)| {
                notes.remove(&id).map(|note| Hit {
                    id,
                    body: note.body,
                    score,
                })
            })
            .take(k)
            .collect();

        tracing::debug!(
            query = %normalized,
            k,
            vector = vector_hits.len(),
            lexical = lexical_hits.len(),
            returned = hits.len(),
            "Hybrid query"
        );

        if degraded.is_none() {
            let cached = hits.iter().map(|h| (h.id, h.body.clone(), h.score)).collect();
            shared
                .queries
                .insert(QueryKey::new(&normalized, k, scope, generation), Arc::new(cached));
        }
        drop(index);

        Ok(SearchResults { hits, degraded })
    }

    /// Retrieval-augmented answer from the configured generation backend.
    pub fn ask(&self, question: &str, scope: &Scope) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(BrainError::Validation("question is empty".into()));
        }

        let results = self.topk(question, self.brain.shared.config.search.ask_k, scope)?;
        if results.hits.is_empty() {
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                context: Vec::new(),
                degraded: results.degraded,
            });
        }

        let generator = self
            .brain
            .shared
            .generator
            .as_ref()
            .ok_or_else(|| BrainError::BackendUnavailable("no generation backend configured".into()))?;

        let answer = generator.generate(&build_prompt(question, &results.hits))?;
        Ok(Answer {
            answer: answer.trim().to_string(),
            context: results.hits,
            degraded: results.degraded,
        })
    }

    pub fn export(&self) -> Result<Vec<ExportedNote>> {
        self.store.export()
    }

    /// Write the export as pretty JSON. Returns the number of notes written.
    pub fn export_json<W: Write>(&self, mut writer: W) -> Result<usize> {
        let notes = self.store.export()?;
        serde_json::to_writer_pretty(&mut writer, &notes)?;
        writer.write_all(b"\n")?;
        Ok(notes.len())
    }

    pub fn backup(&self, dest: &Path) -> Result<()> {
        self.store.backup(dest)
    }

    pub fn stats(&self) -> Result<BrainStats> {
        let index = self.brain.shared.index.read();
        let store = self.store.get_stats()?;
        let db_bytes = std::fs::metadata(self.db_path()).map(|m| m.len()).unwrap_or(0);

        Ok(BrainStats {
            store,
            live_vectors: index.size(),
            vector_slots: index.slot_count(),
            cached_embeddings: self.brain.shared.embeddings.entry_count(),
            cached_queries: self.brain.shared.queries.entry_count(),
            db_bytes,
            db_path: self.db_path().to_path_buf(),
        })
    }

    /// Rebuild the full-text index from the notes table.
    pub fn rebuild_lexical(&self) -> Result<usize> {
        let _index = self.brain.shared.index.write();
        let tx = self.store.begin()?;
        let count = self.store.lexical().rebuild()?;
        tx.commit()?;
        self.brain.bump_generation();

        tracing::info!(count, "Lexical index rebuilt");
        Ok(count)
    }

    /// Replace the vector index with a fresh graph loaded from stored
    /// embeddings. Drops every tombstone.
    pub fn rebuild_vectors(&self) -> Result<LoadReport> {
        let mut index = self.brain.shared.index.write();
        let mut fresh = VectorIndex::new(self.brain.shared.config.index.clone());
        let report = match self.store.dimension()? {
            Some(dim) => fresh.initialize(dim, self.store.embedded_rows()?)?,
            None => LoadReport::default(),
        };
        *index = fresh;
        self.brain.bump_generation();
        Ok(report)
    }

    /// Embed notes stored without a vector, e.g. while the backend was down.
    pub fn embed_missing(&self) -> Result<EmbedReport> {
        let pending: Vec<Note> = self
            .store
            .list(&NoteFilter::default(), None)?
            .into_iter()
            .filter(|n| !n.embedded)
            .collect();

        let mut report = EmbedReport::default();
        for note in pending {
            if normalize(&note.body).is_empty() {
                continue;
            }
            match self.rewrite(note.id, &note.body, None, Some(&note)) {
                Ok(Some(r)) if r.embedded => report.embedded += 1,
                Ok(Some(_)) => report.failed += 1,
                Ok(None) | Err(BrainError::NotFound(_)) => report.skipped += 1,
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }
}

fn build_prompt(question: &str, context: &[Hit]) -> String {
    let mut prompt = String::from("Here are my notes:\n");
    for hit in context {
        prompt.push_str(&format!("[[{}]] {}\n", hit.id, hit.body));
    }
    prompt.push_str(
        "\nUsing ONLY these notes, answer the question below. \
         If the answer isn't in the notes, say 'I don't know.' \
         Cite notes with [[nid]].\n\n",
    );
    prompt.push_str(&format!("Question: {}\nAnswer:", question.trim()));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_context_with_ids() {
        let hits = vec![
            Hit { id: 3, body: "The quick brown fox".into(), score: 1.0 },
            Hit { id: 9, body: "Foxes are omnivores".into(), score: 0.5 },
        ];
        let prompt = build_prompt("  what do foxes eat? ", &hits);

        assert!(prompt.starts_with("Here are my notes:\n[[3]] The quick brown fox\n[[9]] Foxes"));
        assert!(prompt.contains("Cite notes with [[nid]]"));
        assert!(prompt.ends_with("Question: what do foxes eat?\nAnswer:"));
    }
}
