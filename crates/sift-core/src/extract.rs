//! Block extraction from file content
//!
//! Uses tree-sitter for intelligent code parsing when available,
//! falls back to simple text chunking for unsupported file types.

use std::path::Path;

use crate::parse::{CodeLanguage, CodeParser};
use crate::{Block, Config, Result, SiftError};

/// Known text file extensions
const TEXT_EXTENSIONS: &[&str] = &[
    // Plain text
    "txt", "md", "rst", "org", "adoc",
    // Code
    "rs", "py", "js", "ts", "jsx", "tsx", "go", "java", "c", "cpp", "h", "hpp",
    "cs", "rb", "php", "swift", "kt", "scala", "hs", "ml", "ex", "exs", "erl",
    "clj", "cljs", "lisp", "scm", "lua", "r", "jl", "nim", "zig", "v", "d",
    // Web
    "html", "htm", "css", "scss", "sass", "less", "vue", "svelte",
    // Config
    "json", "yaml", "yml", "toml", "xml", "ini", "cfg", "conf",
    // Shell
    "sh", "bash", "zsh", "fish", "ps1", "bat", "cmd",
    // Data
    "csv", "sql",
    // Docs
    "tex", "bib",
];

/// Kind given to blocks produced by plain text chunking.
pub const CHUNK_KIND: &str = "chunk";

/// Turns one file's content into named blocks.
pub trait Extract {
    /// Extract blocks from `content`. `path` is root-relative and only used
    /// to pick a strategy and to name fallback chunks.
    fn extract(&mut self, path: &str, content: &str) -> Result<Vec<Block>>;
}

/// Check if a file extension indicates a text file.
pub fn is_text_extension(ext: &str) -> bool {
    TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// Check if a file should be indexed based on config and extension.
pub fn should_index(path: &Path, config: &Config) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    // Check exclude list first
    if config
        .exclude_extensions
        .iter()
        .any(|e| e.to_lowercase() == ext)
    {
        return false;
    }

    // If include list is specified, only include those
    if !config.include_extensions.is_empty() {
        return config
            .include_extensions
            .iter()
            .any(|e| e.to_lowercase() == ext);
    }

    // Default: check if it's a known text extension
    is_text_extension(&ext)
}

/// Default extractor: tree-sitter definitions, text chunks otherwise.
pub struct CodeExtractor {
    parser: CodeParser,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl CodeExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            parser: CodeParser::new(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

impl Extract for CodeExtractor {
    fn extract(&mut self, path: &str, content: &str) -> Result<Vec<Block>> {
        if content.contains('\0') {
            return Err(SiftError::Extraction(format!("{path}: binary content")));
        }

        let file_name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);

        let lang = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(CodeLanguage::from_extension);

        if let Some(lang) = lang {
            let blocks = self.parser.parse(lang, content)?;
            if !blocks.is_empty() {
                return Ok(split_large_blocks(
                    blocks,
                    self.chunk_size,
                    self.chunk_overlap,
                ));
            }
        }

        // Fall back to simple text chunking
        Ok(chunk_text(content, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .map(|(start_line, end_line, text)| Block {
                kind: CHUNK_KIND.to_string(),
                name: file_name.to_string(),
                start_line,
                end_line,
                content: text.to_string(),
            })
            .collect())
    }
}

/// Split definitions far larger than a chunk (e.g. huge functions) into parts
/// that keep the definition's kind and name.
fn split_large_blocks(blocks: Vec<Block>, chunk_size: usize, overlap: usize) -> Vec<Block> {
    let mut result = Vec::with_capacity(blocks.len());
    for block in blocks {
        if block.content.len() <= chunk_size * 2 {
            result.push(block);
            continue;
        }
        for (start, end, text) in chunk_text(&block.content, chunk_size, overlap) {
            result.push(Block {
                kind: block.kind.clone(),
                name: block.name.clone(),
                start_line: block.start_line + start - 1,
                end_line: block.start_line + end - 1,
                content: text.to_string(),
            });
        }
    }
    result
}

/// Split text into line-aligned chunks with overlap.
///
/// Returns `(start_line, end_line, text)` triples with 1-indexed lines.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<(usize, usize, &str)> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let start_pos = pos;
        let end_pos = floor_char_boundary(text, (pos + chunk_size).min(text.len()));

        // Find the actual end position (try to break at line boundary)
        let chunk_end = if end_pos < text.len() {
            text[start_pos..end_pos]
                .rfind('\n')
                .map(|p| start_pos + p + 1)
                .unwrap_or(end_pos)
        } else {
            end_pos
        };
        // A single char wider than the chunk size still has to make progress
        let chunk_end = if chunk_end == start_pos {
            ceil_char_boundary(text, start_pos + 1)
        } else {
            chunk_end
        };

        let chunk = &text[start_pos..chunk_end];
        let start_line = text[..start_pos].matches('\n').count() + 1;
        let end_line = start_line + chunk.trim_end_matches('\n').matches('\n').count();
        chunks.push((start_line, end_line, chunk));

        if chunk_end >= text.len() {
            break;
        }

        // Move forward, accounting for overlap
        pos = if overlap < chunk_end - start_pos {
            floor_char_boundary(text, chunk_end - overlap).max(start_pos + 1)
        } else {
            chunk_end
        };
        pos = ceil_char_boundary(text, pos);
    }

    chunks
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
