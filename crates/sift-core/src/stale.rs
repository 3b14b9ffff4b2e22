//! Change detection against the manifest

use std::collections::{BTreeMap, BTreeSet};

use crate::{HASH_LEN, Manifest};

/// Short fingerprint of file content (truncated blake3 hex).
pub fn content_hash(content: &[u8]) -> String {
    let mut hash = blake3::hash(content).to_hex().to_string();
    hash.truncate(HASH_LEN);
    hash
}

/// Paths that need reindexing and paths that disappeared since the last run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleSet {
    /// New paths, or paths whose content hash differs from the manifest
    pub changed: BTreeSet<String>,
    /// Paths in the manifest that are no longer present
    pub deleted: BTreeSet<String>,
}

impl StaleSet {
    /// Number of files needing work.
    pub fn needs_update(&self) -> usize {
        self.changed.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// Partition the current file set against the manifest.
pub fn diff(files: &BTreeMap<String, String>, manifest: &Manifest) -> StaleSet {
    let changed = files
        .iter()
        .filter(|(path, content)| {
            manifest.hash_of(path) != Some(content_hash(content.as_bytes()).as_str())
        })
        .map(|(path, _)| path.clone())
        .collect();

    let deleted = manifest
        .files
        .keys()
        .filter(|path| !files.contains_key(*path))
        .cloned()
        .collect();

    StaleSet { changed, deleted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileEntry;

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    fn manifest(entries: &[(&str, &str)]) -> Manifest {
        let mut manifest = Manifest::new();
        for (path, content) in entries {
            manifest.files.insert(
                path.to_string(),
                FileEntry::new(content_hash(content.as_bytes()), vec![]),
            );
        }
        manifest
    }

    #[test]
    fn test_content_hash_is_short_and_stable() {
        let a = content_hash(b"def login(): pass\n");
        assert_eq!(a.len(), HASH_LEN);
        assert_eq!(a, content_hash(b"def login(): pass\n"));
        assert_ne!(a, content_hash(b"def login(): pass \n"));
    }

    #[test]
    fn test_everything_new_on_empty_manifest() {
        let current = files(&[("a.py", "x"), ("b.py", "y")]);
        let stale = diff(&current, &Manifest::new());
        assert_eq!(stale.changed.len(), 2);
        assert!(stale.deleted.is_empty());
        assert_eq!(stale.needs_update(), 2);
    }

    #[test]
    fn test_unchanged_files_are_fresh() {
        let current = files(&[("a.py", "x"), ("b.py", "y")]);
        let stale = diff(&current, &manifest(&[("a.py", "x"), ("b.py", "y")]));
        assert!(stale.is_empty());
        assert_eq!(stale.needs_update(), 0);
    }

    #[test]
    fn test_changed_and_deleted() {
        let current = files(&[("a.py", "x2"), ("c.py", "z")]);
        let stale = diff(&current, &manifest(&[("a.py", "x"), ("b.py", "y")]));

        assert_eq!(
            stale.changed,
            BTreeSet::from(["a.py".to_string(), "c.py".to_string()])
        );
        assert_eq!(stale.deleted, BTreeSet::from(["b.py".to_string()]));
        assert_eq!(stale.needs_update(), 3);
    }
}
