//! Code blocks and their identity in the vector store

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A named code fragment extracted from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Kind of definition (e.g. `function_definition`, `class`, `chunk`)
    pub kind: String,
    /// Definition name
    pub name: String,
    /// Starting line number (1-indexed)
    pub start_line: usize,
    /// Ending line number (1-indexed)
    pub end_line: usize,
    /// The raw source text
    pub content: String,
}

impl Block {
    /// Text handed to the embedder: kind and name on the first line, then the source.
    pub fn embedding_text(&self) -> String {
        format!("{} {}\n{}", self.kind, self.name, self.content)
    }
}

/// Metadata stored with each vector, enough to display a result without
/// re-reading the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockPayload {
    /// Block id (also the store key)
    pub block_id: String,
    /// Relative file path from the index root
    pub file: String,
    /// Kind of definition
    #[serde(rename = "type")]
    pub kind: String,
    /// Definition name
    pub name: String,
    /// Starting line number
    pub start_line: usize,
    /// Ending line number
    pub end_line: usize,
    /// The source text
    pub content: String,
}

impl BlockPayload {
    pub fn new(block_id: String, file: &str, block: &Block) -> Self {
        Self {
            block_id,
            file: file.to_string(),
            kind: block.kind.clone(),
            name: block.name.clone(),
            start_line: block.start_line,
            end_line: block.end_line,
            content: block.content.clone(),
        }
    }
}

/// Derive the store key for a block: `path:start_line:name`.
pub fn block_id(path: &str, start_line: usize, name: &str) -> String {
    format!("{path}:{start_line}:{name}")
}

/// Assigns block ids for one file, keeping them unique within it.
///
/// Two blocks sharing a start line and a name would otherwise collide and the
/// second upsert would silently replace the first. Repeats get a `#n` suffix
/// in extraction order, so the assignment stays deterministic across runs.
#[derive(Debug, Default)]
pub struct BlockIds {
    seen: HashMap<String, usize>,
}

impl BlockIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for the next block of `path`.
    pub fn assign(&mut self, path: &str, block: &Block) -> String {
        let base = block_id(path, block.start_line, &block.name);
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            tracing::debug!("Duplicate block id {base}, disambiguating as #{count}");
            format!("{base}#{count}")
        }
    }
}
