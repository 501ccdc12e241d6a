//! Error taxonomy for the retrieval engine

use crate::core::note::NoteId;

pub type Result<T> = std::result::Result<T, BrainError>;

#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    /// Rejected before any index was touched; retry with corrected input.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Embedding backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Embedding backend returned an unusable response: {0}")]
    BackendModel(String),

    #[error("Index out of sync with note store: {0}")]
    IndexInconsistency(String),

    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Note {0} not found")]
    NotFound(NoteId),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl BrainError {
    /// Backend failures are reported as warnings on writes instead of failing them.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::BackendModel(_) | Self::DimensionMismatch { .. }
        )
    }

    /// Short machine-readable kind, used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::BackendModel(_) => "backend_model",
            Self::IndexInconsistency(_) => "index_inconsistency",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::NotFound(_) => "not_found",
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Config(_) => "config",
        }
    }
}

impl From<serde_yaml::Error> for BrainError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}
