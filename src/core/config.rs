//! `config.yaml` in the store home. Every field has a default, so a missing
//! file or a partial one is fine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BrainError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub chunking: ChunkingConfig,
    pub cache: CacheConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ollama,
    /// Offline deterministic embeddings, no generation
    Harmonic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub url: String,
    pub embed_model: String,
    pub generate_model: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Ollama,
            url: "http://localhost:11434".to_string(),
            embed_model: "mxbai-embed-large".to_string(),
            generate_model: "llama3".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_words: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub embeddings: u64,
    pub queries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            embeddings: 128,
            queries: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub max_connections: usize,
    pub max_elements: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_connections: 32,
            max_elements: 100_000,
            ef_construction: 200,
            ef_search: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    pub ask_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 4,
            ask_k: 6,
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.embeddings == 0 || self.cache.queries == 0 {
            return Err(BrainError::Config("cache capacities must be positive".into()));
        }
        if self.index.max_connections == 0 || self.index.max_elements == 0 {
            return Err(BrainError::Config(
                "index.max_connections and index.max_elements must be positive".into(),
            ));
        }
        if self.chunking.max_words == 0 {
            return Err(BrainError::Config("chunking.max_words must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() -> Result<()> {
        let config = Config::parse(
            r#"
backend:
  kind: harmonic
chunking:
  max_words: 500
"#,
        )?;

        assert_eq!(config.backend.kind, BackendKind::Harmonic);
        assert_eq!(config.backend.url, "http://localhost:11434");
        assert_eq!(config.chunking.max_words, 500);
        assert_eq!(config.cache, CacheConfig::default());
        Ok(())
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = Config::parse("cache:\n  queries: 0\n").unwrap_err();
        assert!(matches!(err, BrainError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_default() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let config = Config::load(&tmp.path().join("config.yaml"))?;
        assert_eq!(config, Config::default());
        Ok(())
    }

    #[test]
    fn test_bad_yaml_is_config_error() {
        assert!(matches!(Config::parse("backend: [1, 2"), Err(BrainError::Config(_))));
    }
}
