//! Discovery module: locate index roots and the files inside .sift

use std::path::{Path, PathBuf};

use crate::{CONFIG_FILE, INDEX_DIR, LOCK_FILE, MANIFEST_FILE, VECTORS_DIR};

/// Find the nearest indexed root by walking up from the given path.
///
/// Returns the directory containing `.sift/manifest.json` (not the `.sift`
/// folder itself), or `None` if no ancestor has been indexed.
pub fn find_index_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.canonicalize().ok()?;

    loop {
        if manifest_path(&current).is_file() {
            return Some(current);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

/// Get the .sift directory path for a given root.
pub fn index_dir(root: &Path) -> PathBuf {
    root.join(INDEX_DIR)
}

/// Get the vector store directory path.
pub fn vectors_dir(root: &Path) -> PathBuf {
    index_dir(root).join(VECTORS_DIR)
}

/// Get the manifest path.
pub fn manifest_path(root: &Path) -> PathBuf {
    index_dir(root).join(MANIFEST_FILE)
}

/// Get the config file path.
pub fn config_path(root: &Path) -> PathBuf {
    index_dir(root).join(CONFIG_FILE)
}

/// Get the writer lock path. It lives outside .sift so `clear` can remove
/// the index folder while the lock is held.
pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}
