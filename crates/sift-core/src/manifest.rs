//! Manifest of indexed files stored in .sift/manifest.json
//!
//! The manifest maps each indexed path to the hash of its content and the ids
//! of the blocks it contributed to the vector store. It is the only record of
//! which vectors belong to which file, so a file's vectors can be removed when
//! the file changes or disappears.
//!
//! Two document shapes exist on disk. Legacy documents map a path straight to
//! its hash:
//!
//! ```json
//! {"files": {"src/main.rs": "1f2e3d4c5b6a7980"}}
//! ```
//!
//! Current documents store a record per path:
//!
//! ```json
//! {"version": 2, "model": "all-MiniLM-L6-v2",
//!  "files": {"src/main.rs": {"hash": "1f2e3d4c5b6a7980", "block_ids": ["src/main.rs:1:main"]}}}
//! ```
//!
//! Legacy entries are upgraded on load into records with no block ids.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Result, discover};

/// Current on-disk manifest version.
pub const MANIFEST_VERSION: u32 = 2;

/// Manifest record for one indexed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Truncated content hash at last index time
    pub hash: String,
    /// Ids of the vectors this file currently owns in the store
    #[serde(default, alias = "blocks")]
    pub block_ids: Vec<String>,
}

impl FileEntry {
    pub fn new(hash: impl Into<String>, block_ids: Vec<String>) -> Self {
        Self {
            hash: hash.into(),
            block_ids,
        }
    }
}

/// Indexed state of one root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub version: u32,
    /// Embedding model the vectors were produced with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Map of relative path -> entry
    pub files: BTreeMap<String, FileEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            ..Self::default()
        }
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn hash_of(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(|entry| entry.hash.as_str())
    }

    /// Total number of block ids tracked across all files.
    pub fn block_count(&self) -> usize {
        self.files.values().map(|entry| entry.block_ids.len()).sum()
    }
}

/// A manifest value as it may appear on disk.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Current(FileEntry),
    Legacy(String),
}

impl From<StoredEntry> for FileEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Current(entry) => entry,
            StoredEntry::Legacy(hash) => FileEntry::new(hash, Vec::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoredManifest {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    files: BTreeMap<String, StoredEntry>,
}

impl From<StoredManifest> for Manifest {
    fn from(stored: StoredManifest) -> Self {
        if stored.version.unwrap_or(1) < MANIFEST_VERSION {
            tracing::debug!("Migrating manifest to version {MANIFEST_VERSION}");
        }
        Self {
            version: MANIFEST_VERSION,
            model: stored.model,
            files: stored
                .files
                .into_iter()
                .map(|(path, entry)| (path, entry.into()))
                .collect(),
        }
    }
}

/// Parse a manifest document, upgrading legacy entries.
pub fn parse(content: &str) -> serde_json::Result<Manifest> {
    let stored: StoredManifest = serde_json::from_str(content)?;
    Ok(stored.into())
}

/// Reads and writes the manifest of one index root.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: discover::manifest_path(root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the manifest.
    ///
    /// Never fails: a missing document is an empty manifest, and an unreadable
    /// or corrupt one is logged and treated as empty, so the next run rebuilds.
    pub fn load(&self) -> Manifest {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Manifest::new(),
            Err(e) => {
                tracing::warn!("Failed to read manifest {}: {}", self.path.display(), e);
                return Manifest::new();
            }
        };

        match parse(&content) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(
                    "Ignoring corrupt manifest {}: {}",
                    self.path.display(),
                    e
                );
                Manifest::new()
            }
        }
    }

    /// Replace the on-disk manifest.
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(manifest)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ManifestStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(temp.path());
        (temp, store)
    }

    #[test]
    fn test_missing_manifest_is_empty() {
        let (_temp, store) = store();
        assert!(!store.exists());
        let manifest = store.load();
        assert!(manifest.files.is_empty());
        assert_eq!(manifest.version, MANIFEST_VERSION);
    }

    #[test]
    fn test_legacy_manifest_migrates() {
        let manifest = parse(r#"{"files": {"a.py": "0123456789abcdef", "b.rs": "fedcba9876543210"}}"#)
            .unwrap();

        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(
            manifest.get("a.py"),
            Some(&FileEntry::new("0123456789abcdef", vec![]))
        );
        assert_eq!(manifest.hash_of("b.rs"), Some("fedcba9876543210"));
        assert!(manifest.files.values().all(|e| e.block_ids.is_empty()));
    }

    #[test]
    fn test_mixed_manifest_migrates() {
        let manifest = parse(
            r#"{"files": {
                "old.py": "aaaaaaaaaaaaaaaa",
                "new.py": {"hash": "bbbbbbbbbbbbbbbb", "blocks": ["new.py:1:f"]}
            }}"#,
        )
        .unwrap();

        assert_eq!(manifest.get("old.py").unwrap().block_ids, Vec::<String>::new());
        assert_eq!(manifest.get("new.py").unwrap().block_ids, vec!["new.py:1:f"]);
    }

    #[test]
    fn test_save_and_load() {
        let (_temp, store) = store();
        let mut manifest = Manifest::new();
        manifest.model = Some("all-MiniLM-L6-v2".into());
        manifest.files.insert(
            "src/lib.rs".into(),
            FileEntry::new("00ff00ff00ff00ff", vec!["src/lib.rs:1:main".into()]),
        );

        store.save(&manifest).unwrap();
        assert!(store.exists());
        assert_eq!(store.load(), manifest);
        assert_eq!(store.load().block_count(), 1);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"block_ids\""));
    }

    #[test]
    fn test_legacy_file_upgraded_on_load() {
        let (_temp, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), r#"{"files": {"a.py": "0123456789abcdef"}}"#).unwrap();

        let manifest = store.load();
        assert_eq!(manifest.hash_of("a.py"), Some("0123456789abcdef"));
        assert!(manifest.get("a.py").unwrap().block_ids.is_empty());
    }

    #[test]
    fn test_corrupt_manifest_is_empty() {
        let (_temp, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();

        assert!(store.load().files.is_empty());
    }
}
