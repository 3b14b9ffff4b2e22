//! Indexing pipeline: detect changes, extract blocks, embed, store
//!
//! The manifest is the durable record tying each file to the vectors it
//! owns. A file's old vectors are always deleted before it is re-extracted,
//! and new manifest entries are written only after every embedding batch has
//! been stored. A run interrupted in between leaves vectors the manifest does
//! not know about; the next run sees those files as changed again and
//! overwrites them under the same ids.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::block::BlockIds;
use crate::stale::{self, StaleSet, content_hash};
use crate::{
    BlockPayload, CodeExtractor, Config, Embed, Embedder, Extract, FileEntry, Manifest,
    ManifestStore, Result, SiftError, Storage, VectorItem, VectorStore, discover,
};

/// Progress events emitted during indexing.
#[derive(Debug, Clone)]
pub enum ProgressEvent<'a> {
    /// Extracting blocks from a changed file.
    Extracting {
        current: usize,
        total: usize,
        path: &'a str,
    },
    /// About to embed the next batch; `current` blocks are already stored.
    Embedding { current: usize, total: usize },
    /// All batches stored.
    Finished { total: usize },
}

impl ProgressEvent<'_> {
    /// `(done, total)` counts for progress bars.
    pub fn position(&self) -> (usize, usize) {
        match *self {
            Self::Extracting { current, total, .. } => (current, total),
            Self::Embedding { current, total } => (current, total),
            Self::Finished { total } => (total, total),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Extracting { path, .. } => format!("Extracting {path}"),
            Self::Embedding { current, total } => {
                format!("Embedding blocks {}/{}...", current, total)
            }
            Self::Finished { total } => format!("Embedded {total} blocks"),
        }
    }
}

/// Type alias for progress callback.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send>;

/// Stats from an indexing run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Files extracted and recorded in the manifest
    pub files: usize,
    /// Blocks embedded and stored
    pub blocks: usize,
    /// Files whose content matched the manifest
    pub skipped: usize,
    /// Files that failed extraction
    pub errors: usize,
    /// Vector ids submitted for removal. A file that keeps failing extraction
    /// keeps its old ids in the manifest, so every retry counts them again
    /// even though the store no longer holds them.
    pub deleted: usize,
}

/// Delete the .sift folder under `root` without loading its config.
///
/// Returns whether there was anything to remove.
pub fn remove_index(root: &Path) -> Result<bool> {
    let dir = discover::index_dir(root);
    if !dir.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(&dir)?;
    tracing::info!("Removed index at {}", dir.display());
    Ok(true)
}

/// A block waiting for its embedding.
struct StagedBlock {
    text: String,
    payload: BlockPayload,
}

/// Incremental semantic index of one root directory.
///
/// Owns its collaborators. The vector store is opened on first use and
/// released by [`SemanticIndex::clear`] or on drop.
pub struct SemanticIndex<E: Embed, S: VectorStore, X: Extract> {
    root: PathBuf,
    batch_size: usize,
    embedder: E,
    extractor: X,
    manifests: ManifestStore,
    store: Option<S>,
    progress_callback: Option<ProgressCallback>,
    cancel: Option<Arc<AtomicBool>>,
}

/// Index backed by fastembed, Qdrant Edge and tree-sitter.
pub type DefaultIndex = SemanticIndex<Embedder, Storage, CodeExtractor>;

impl DefaultIndex {
    /// Create an index for `root` using its .sift/config.json (or defaults).
    pub fn open(root: PathBuf) -> Result<Self> {
        let config = Config::load(&root)?;
        let embedder = Embedder::new(&config)?;
        let extractor = CodeExtractor::new(&config);
        Ok(Self::with_parts(root, config.batch_size, embedder, extractor))
    }
}

impl<E: Embed, S: VectorStore, X: Extract> SemanticIndex<E, S, X> {
    pub fn with_parts(root: PathBuf, batch_size: usize, embedder: E, extractor: X) -> Self {
        Self {
            manifests: ManifestStore::new(&root),
            root,
            batch_size: batch_size.max(1),
            embedder,
            extractor,
            store: None,
            progress_callback: None,
            cancel: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Set a callback to receive progress updates during indexing.
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress_callback = Some(callback);
    }

    /// Set a flag that aborts indexing before the next embedding batch.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    /// Emit a progress event if a callback is registered.
    fn emit_progress(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.progress_callback {
            callback(event);
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(SiftError::Cancelled),
            _ => Ok(()),
        }
    }

    /// The vector store, opened on first use.
    pub(crate) fn store(&mut self) -> Result<&mut S> {
        if self.store.is_none() {
            let path = discover::vectors_dir(&self.root);
            tracing::debug!("Opening vector store at {}", path.display());
            self.store = Some(S::open(&path, self.embedder.dimension())?);
        }
        self.store
            .as_mut()
            .ok_or_else(|| SiftError::Storage("Vector store not open".to_string()))
    }

    /// Refuse to mix vectors from different embedding models.
    pub(crate) fn check_model(&self, manifest: &Manifest) -> Result<()> {
        match &manifest.model {
            Some(indexed) if !manifest.files.is_empty() && indexed != self.embedder.model_id() => {
                Err(SiftError::ModelMismatch {
                    indexed: indexed.clone(),
                    configured: self.embedder.model_id().to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn manifest(&self) -> Manifest {
        self.manifests.load()
    }

    pub(crate) fn embed_query(&mut self, query: &str) -> Result<Vec<f32>> {
        self.embedder.embed(query)
    }

    fn flush(&self) {
        if let Some(store) = &self.store {
            store.flush();
        }
    }

    /// Files that changed or disappeared since the last run.
    pub fn stale(&self, files: &BTreeMap<String, String>) -> StaleSet {
        stale::diff(files, &self.manifests.load())
    }

    /// Number of files that need reindexing or removal.
    pub fn needs_update(&self, files: &BTreeMap<String, String>) -> usize {
        self.stale(files).needs_update()
    }

    /// Whether this root has a manifest.
    pub fn is_indexed(&self) -> bool {
        self.manifests.exists()
    }

    /// Number of vectors in the store, 0 when the root is not indexed.
    pub fn count(&mut self) -> Result<usize> {
        if !self.is_indexed() {
            return Ok(0);
        }
        self.store()?.count()
    }

    /// Delete the whole .sift folder: manifest, vectors and config.
    pub fn clear(&mut self) -> Result<()> {
        // Release the store before removing its files
        self.store = None;
        remove_index(&self.root)?;
        Ok(())
    }

    /// Index the given files (`relative path -> content`).
    ///
    /// Unchanged files are skipped. A file that fails extraction is counted in
    /// `errors` and keeps its manifest entry, though its old vectors are gone.
    pub fn index(&mut self, files: &BTreeMap<String, String>) -> Result<IndexStats> {
        let files: Vec<(&str, &str)> = files
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_str()))
            .collect();
        self.index_files(&files)
    }

    /// Bring the index in line with the full current file set.
    ///
    /// Removes vectors of files that no longer exist and reindexes changed
    /// ones. Returns without touching the store or manifest when nothing is
    /// stale.
    pub fn update(&mut self, files: &BTreeMap<String, String>) -> Result<IndexStats> {
        let mut manifest = self.manifests.load();
        let stale = stale::diff(files, &manifest);

        if stale.is_empty() {
            return Ok(IndexStats {
                skipped: files.len(),
                ..IndexStats::default()
            });
        }
        self.check_model(&manifest)?;

        let mut deleted = 0;
        if !stale.deleted.is_empty() {
            for path in &stale.deleted {
                let Some(entry) = manifest.files.remove(path) else {
                    continue;
                };
                if !entry.block_ids.is_empty() {
                    self.store()?.delete(&entry.block_ids)?;
                    deleted += entry.block_ids.len();
                }
                tracing::debug!("Removed {} ({} blocks)", path, entry.block_ids.len());
            }
            self.flush();
            self.manifests.save(&manifest)?;
        }

        let changed: Vec<(&str, &str)> = stale
            .changed
            .iter()
            .filter_map(|path| {
                files
                    .get_key_value(path)
                    .map(|(p, content)| (p.as_str(), content.as_str()))
            })
            .collect();

        let mut stats = self.index_files(&changed)?;
        stats.deleted += deleted;
        Ok(stats)
    }

    fn index_files(&mut self, files: &[(&str, &str)]) -> Result<IndexStats> {
        let mut manifest = self.manifests.load();
        self.check_model(&manifest)?;

        let mut stats = IndexStats::default();
        let mut staged: Vec<StagedBlock> = Vec::new();
        let mut pending: BTreeMap<String, FileEntry> = BTreeMap::new();

        for (i, &(path, content)) in files.iter().enumerate() {
            let hash = content_hash(content.as_bytes());
            let previous = manifest.get(path);

            if previous.is_some_and(|entry| entry.hash == hash) {
                stats.skipped += 1;
                continue;
            }

            self.emit_progress(ProgressEvent::Extracting {
                current: i + 1,
                total: files.len(),
                path,
            });

            // Old vectors go first, whatever the new block layout turns out to be
            if let Some(entry) = previous.filter(|entry| !entry.block_ids.is_empty()) {
                self.store()?.delete(&entry.block_ids)?;
                stats.deleted += entry.block_ids.len();
            }

            let blocks = match self.extractor.extract(path, content) {
                Ok(blocks) => blocks,
                Err(e) => {
                    tracing::warn!("Failed to extract {}: {}", path, e);
                    stats.errors += 1;
                    continue;
                }
            };

            let mut ids = BlockIds::new();
            let mut block_ids = Vec::with_capacity(blocks.len());
            for block in &blocks {
                let id = ids.assign(path, block);
                block_ids.push(id.clone());
                staged.push(StagedBlock {
                    text: block.embedding_text(),
                    payload: BlockPayload::new(id, path, block),
                });
            }
            tracing::debug!("Extracted {} blocks from {}", block_ids.len(), path);

            pending.insert(path.to_string(), FileEntry::new(hash, block_ids));
            stats.files += 1;
        }

        self.embed_and_store(staged, &mut stats)?;

        if !pending.is_empty() {
            manifest.files.extend(pending);
            manifest.model = Some(self.embedder.model_id().to_string());
            self.flush();
            self.manifests.save(&manifest)?;
        } else if stats.deleted > 0 {
            self.flush();
        }

        tracing::info!(
            "Indexed {} files ({} blocks), skipped {}, errors {}, deleted {}",
            stats.files,
            stats.blocks,
            stats.skipped,
            stats.errors,
            stats.deleted
        );

        Ok(stats)
    }

    /// Embed staged blocks batch by batch, storing each batch before the next.
    fn embed_and_store(&mut self, staged: Vec<StagedBlock>, stats: &mut IndexStats) -> Result<()> {
        let total = staged.len();
        if total == 0 {
            return Ok(());
        }

        let mut staged = staged.into_iter();
        loop {
            let batch: Vec<StagedBlock> = staged.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            self.check_cancelled()?;
            self.emit_progress(ProgressEvent::Embedding {
                current: stats.blocks,
                total,
            });

            let texts: Vec<&str> = batch.iter().map(|b| b.text.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            if vectors.len() != batch.len() {
                return Err(SiftError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let count = batch.len();
            let items = batch
                .into_iter()
                .zip(vectors)
                .map(|(staged, vector)| VectorItem {
                    id: staged.payload.block_id.clone(),
                    vector,
                    payload: staged.payload,
                })
                .collect();
            self.store()?.upsert(items)?;
            stats.blocks += count;
        }

        self.emit_progress(ProgressEvent::Finished { total });
        Ok(())
    }
}
