//! second-brain library
//!
//! Personal note store with hybrid (full-text + vector) retrieval.
//!
//! # Modules
//!
//! - `core`: Note model, normalization, chunking, paths and configuration
//! - `search`: Note store, lexical and vector indexes, hybrid query engine
//! - `error`: Error type shared by every operation

pub mod core;
pub mod error;
pub mod search;

// Re-exports for convenience
pub use core::config::Config;
pub use core::note::{Note, NoteFilter, NoteId, Scope, TimeRange};
pub use core::paths::StorePaths;
pub use error::{BrainError, Result};
pub use search::{Brain, SearchResults, Session, WriteReport};
