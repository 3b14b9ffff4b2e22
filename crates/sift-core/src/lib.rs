//! sift-core: Incremental semantic code index
//!
//! This library keeps a per-directory index of code blocks and their vector
//! embeddings up to date, and answers nearest-neighbour queries against it.
//! Extraction, embedding and vector storage sit behind the [`Extract`],
//! [`Embed`] and [`VectorStore`] traits; the default adapters use tree-sitter,
//! fastembed and Qdrant Edge.

pub mod block;
pub mod config;
pub mod consts;
pub mod discover;
pub mod embed;
pub mod extract;
pub mod grep;
pub mod index;
pub mod manifest;
pub mod parse;
pub mod scan;
pub mod search;
pub mod stale;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use block::{Block, BlockPayload};
pub use config::Config;
pub use consts::*;
pub use discover::find_index_root;
pub use embed::{Embed, Embedder};
pub use extract::{CodeExtractor, Extract};
pub use grep::{Pattern, grep_blocks};
pub use index::{DefaultIndex, IndexStats, ProgressEvent, SemanticIndex, remove_index};
pub use manifest::{FileEntry, Manifest, ManifestStore};
pub use search::SearchResult;
pub use stale::StaleSet;
pub use storage::{Neighbor, Storage, VectorItem, VectorStore};

#[derive(Debug, thiserror::Error)]
pub enum SiftError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Index was built with model {indexed}, but {configured} is configured (run 'sift rebuild')")]
    ModelMismatch { indexed: String, configured: String },

    #[error("Indexing cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SiftError>;
