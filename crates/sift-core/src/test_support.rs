//! In-process collaborators for tests: no model downloads, no Qdrant shard.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{
    Block, BlockPayload, Embed, Extract, Neighbor, Result, SemanticIndex, SiftError, VectorItem,
    VectorStore,
};

pub const TEST_DIMS: usize = 64;
pub const TEST_MODEL: &str = "hashing-test-model";

/// Deterministic bag-of-words embedder. Identical texts map to identical
/// unit vectors; texts sharing words point in similar directions.
#[derive(Debug, Default)]
pub struct HashEmbedder {
    /// Sizes of every batch passed to `embed_batch`, in call order
    pub batches: Vec<usize>,
    /// Fail the call with this index (0-based), once
    pub fail_on_call: Option<usize>,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_call(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; TEST_DIMS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let slot = bytes[0] as usize % TEST_DIMS;
            let sign = if bytes[1] & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            vector[0] = 1.0;
        } else {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Embed for HashEmbedder {
    fn model_id(&self) -> &str {
        TEST_MODEL
    }

    fn dimension(&self) -> usize {
        TEST_DIMS
    }

    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let call = self.batches.len();
        self.batches.push(texts.len());
        if self.fail_on_call == Some(call) {
            return Err(SiftError::Embedding("simulated embedding failure".into()));
        }
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

/// Brute-force cosine store persisted as JSON, so it survives reopening.
#[derive(Debug)]
pub struct MemoryStore {
    file: PathBuf,
    dims: usize,
    items: BTreeMap<String, (Vec<f32>, BlockPayload)>,
}

impl MemoryStore {
    pub fn ids(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    fn persist(&self) -> Result<()> {
        std::fs::write(&self.file, serde_json::to_vec(&self.items)?)?;
        Ok(())
    }
}

impl VectorStore for MemoryStore {
    fn open(path: &Path, dims: usize) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let file = path.join("store.json");
        let items = if file.exists() {
            serde_json::from_slice(&std::fs::read(&file)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { file, dims, items })
    }

    fn upsert(&mut self, items: Vec<VectorItem>) -> Result<()> {
        for item in items {
            if item.vector.len() != self.dims {
                return Err(SiftError::Storage("dimension mismatch".into()));
            }
            self.items.insert(item.id, (item.vector, item.payload));
        }
        self.persist()
    }

    fn delete(&mut self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.items.remove(id);
        }
        self.persist()
    }

    fn search(&self, vector: Vec<f32>, k: usize) -> Result<Vec<Neighbor>> {
        let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
        let query_norm = norm(vector.as_slice());
        let mut hits: Vec<Neighbor> = self
            .items
            .iter()
            .map(|(id, (stored, payload))| {
                let dot: f32 = stored.iter().zip(&vector).map(|(a, b)| a * b).sum();
                let cosine = dot / (norm(stored.as_slice()) * query_norm);
                Neighbor {
                    id: id.clone(),
                    distance: 1.0 - cosine,
                    payload: payload.clone(),
                }
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.items.len())
    }
}

/// Extracts `def name` lines as function blocks, each running until the
/// next `def`. Content containing `SYNTAX ERROR` fails to extract.
#[derive(Debug, Default)]
pub struct LineExtractor;

impl Extract for LineExtractor {
    fn extract(&mut self, path: &str, content: &str) -> Result<Vec<Block>> {
        if content.contains("SYNTAX ERROR") {
            return Err(SiftError::Extraction(format!("{path}: cannot parse")));
        }

        let lines: Vec<&str> = content.lines().collect();
        let starts: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.starts_with("def "))
            .map(|(i, _)| i)
            .collect();

        Ok(starts
            .iter()
            .enumerate()
            .map(|(n, &start)| {
                let end = starts.get(n + 1).copied().unwrap_or(lines.len());
                let name = lines[start][4..]
                    .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .next()
                    .unwrap_or_default()
                    .to_string();
                Block {
                    kind: "function".into(),
                    name,
                    start_line: start + 1,
                    end_line: end,
                    content: lines[start..end].join("\n"),
                }
            })
            .collect())
    }
}

pub type TestIndex = SemanticIndex<HashEmbedder, MemoryStore, LineExtractor>;

pub fn test_index(root: &Path, batch_size: usize) -> TestIndex {
    test_index_with(root, batch_size, HashEmbedder::new())
}

pub fn test_index_with(root: &Path, batch_size: usize, embedder: HashEmbedder) -> TestIndex {
    SemanticIndex::with_parts(root.to_path_buf(), batch_size, embedder, LineExtractor)
}

pub fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(p, c)| (p.to_string(), c.to_string()))
        .collect()
}
