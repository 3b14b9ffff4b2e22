//! Configuration handling for .sift/config.json

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_MODEL, Result, SiftError, discover,
};

/// Configuration stored in .sift/config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Embedding model name (fastembed model ID)
    #[serde(default = "default_model")]
    pub model: String,

    /// Number of blocks sent to the embedder per call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunk overlap in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Maximum file size to index (bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// File extensions to include (empty = all text files)
    #[serde(default)]
    pub include_extensions: Vec<String>,

    /// File extensions to exclude
    #[serde(default)]
    pub exclude_extensions: Vec<String>,

    /// Additional paths to ignore (on top of .gitignore)
    #[serde(default)]
    pub ignore_paths: Vec<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_file_size: default_max_file_size(),
            include_extensions: Vec::new(),
            exclude_extensions: Vec::new(),
            ignore_paths: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from the .sift directory, falling back to defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = discover::config_path(root);
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to the .sift directory.
    pub fn save(&self, root: &Path) -> Result<()> {
        std::fs::create_dir_all(discover::index_dir(root))?;
        let path = discover::config_path(root);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SiftError::Config("batch_size must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(SiftError::Config("chunk_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(discover::index_dir(temp.path())).unwrap();
        std::fs::write(
            discover::config_path(temp.path()),
            r#"{"batch_size": 16, "exclude_extensions": ["md"]}"#,
        )
        .unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.exclude_extensions, vec!["md".to_string()]);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_save_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            model: "bge-small-en-v1.5".into(),
            ..Config::default()
        };
        config.save(temp.path()).unwrap();
        assert_eq!(Config::load(temp.path()).unwrap(), config);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(discover::index_dir(temp.path())).unwrap();
        std::fs::write(discover::config_path(temp.path()), r#"{"batch_size": 0}"#).unwrap();

        assert!(matches!(
            Config::load(temp.path()),
            Err(SiftError::Config(_))
        ));
    }
}
