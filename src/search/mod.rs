//! Retrieval stack for the note store
//!
//! Leaves first: `store` (SQLite, source of truth) and `lexical` (FTS5 in the
//! same file), `vector` (HNSW over embeddings), `embedding`/`backend` (the
//! two external functions), `cache`, `fusion`, and `engine` which ties them
//! together behind [`Brain`] and [`Session`].

pub mod backend;
pub mod cache;
pub mod embedding;
pub mod engine;
pub mod fusion;
pub mod lexical;
pub mod store;
pub mod vector;

pub use backend::OllamaBackend;
pub use embedding::{EmbeddingBackend, GenerationBackend, HarmonicEmbedder};
pub use engine::{Answer, Brain, BrainStats, Hit, SearchResults, Session, WriteReport};
pub use store::{ExportedNote, NoteStore};
pub use vector::VectorIndex;
