//! Walk an index root and collect the files to index

use std::collections::BTreeMap;
use std::path::Path;

use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;

use crate::{Config, Result, SiftError, discover, extract};

/// Collect `relative path -> content` for every indexable file under `root`.
///
/// Respects .gitignore, skips hidden files and the .sift folder, and applies
/// the config's extension filters, ignore paths and size limit. Paths use `/`
/// separators so manifests are portable.
pub fn scan_files(root: &Path, config: &Config) -> Result<BTreeMap<String, String>> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in &config.ignore_paths {
        overrides
            .add(&format!("!{pattern}"))
            .map_err(|e| SiftError::Config(format!("Invalid ignore path {pattern}: {e}")))?;
    }
    let overrides = overrides
        .build()
        .map_err(|e| SiftError::Config(e.to_string()))?;

    let walker = WalkBuilder::new(root)
        .hidden(true) // Skip hidden files
        .git_ignore(true) // Respect .gitignore
        .git_global(true)
        .git_exclude(true)
        .require_git(false)
        .overrides(overrides)
        .build();

    let index_dir = discover::index_dir(root);
    let mut files = BTreeMap::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();

        if !entry.file_type().is_some_and(|t| t.is_file()) || path.starts_with(&index_dir) {
            continue;
        }

        if !extract::should_index(path, config) {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) if metadata.len() > config.max_file_size => {
                tracing::debug!("Skipping large file {}", path.display());
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        }

        // Non UTF-8 files are not text we can index
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        files.insert(relative_path(root, path), content);
    }

    Ok(files)
}

/// Root-relative path with `/` separators.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_files() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join(".sift")).unwrap();
        fs::create_dir_all(root.join("vendor")).unwrap();
        fs::write(root.join("src/auth.py"), "def login(): pass\n").unwrap();
        fs::write(root.join("src/nested/util.rs"), "fn util() {}\n").unwrap();
        fs::write(root.join("logo.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
        fs::write(root.join(".hidden.py"), "def secret(): pass\n").unwrap();
        fs::write(root.join(".sift/config.json"), "{}").unwrap();
        fs::write(root.join("vendor/lib.py"), "def vendored(): pass\n").unwrap();

        let config = Config {
            ignore_paths: vec!["vendor".into()],
            ..Config::default()
        };
        let files = scan_files(root, &config).unwrap();

        let paths: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["src/auth.py", "src/nested/util.rs"]);
        assert_eq!(files["src/auth.py"], "def login(): pass\n");
    }

    #[test]
    fn test_max_file_size() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("big.txt"), "x".repeat(64)).unwrap();
        fs::write(temp.path().join("small.txt"), "x").unwrap();

        let config = Config {
            max_file_size: 16,
            ..Config::default()
        };
        let files = scan_files(temp.path(), &config).unwrap();
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["small.txt"]);
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/work/project");
        assert_eq!(
            relative_path(root, &root.join("src").join("main.rs")),
            "src/main.rs"
        );
    }
}
