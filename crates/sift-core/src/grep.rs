//! Literal and regex search over scanned files, no index needed
//!
//! Matches are reported as the extracted blocks that contain them. A match
//! outside every block (module-level code, a file that fails extraction) is
//! reported as its own line.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::Regex;

use crate::{Extract, Result, SearchResult, SiftError};

/// Kind given to matching lines that sit outside any block.
pub const LINE_KIND: &str = "line";

/// What to look for.
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(String),
    Regex(Regex),
}

impl Pattern {
    pub fn exact(text: &str) -> Self {
        Self::Exact(text.to_string())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| SiftError::InvalidArgument(format!("Invalid regex {pattern:?}: {e}")))
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Exact(needle) => text.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(text),
        }
    }
}

/// Blocks containing a line that matches `pattern`, in path then line order.
///
/// Every result scores 1.0.
pub fn grep_blocks<X: Extract>(
    files: &BTreeMap<String, String>,
    pattern: &Pattern,
    extractor: &mut X,
) -> Vec<SearchResult> {
    let mut results = Vec::new();

    for (path, content) in files {
        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| pattern.is_match(line))
            .map(|(i, line)| (i + 1, line))
            .collect();
        if lines.is_empty() {
            continue;
        }

        let blocks = extractor.extract(path, content).unwrap_or_else(|e| {
            tracing::debug!("Reporting raw lines for {}: {}", path, e);
            Vec::new()
        });

        // Each block once, however many of its lines match
        let mut hit_blocks = BTreeSet::new();
        for &(line_no, line) in &lines {
            let enclosing = blocks
                .iter()
                .position(|b| b.start_line <= line_no && line_no <= b.end_line);
            match enclosing {
                Some(i) => {
                    hit_blocks.insert(i);
                }
                None => results.push(SearchResult {
                    file: path.clone(),
                    kind: LINE_KIND.to_string(),
                    name: file_name(path),
                    start_line: line_no,
                    end_line: line_no,
                    content: line.to_string(),
                    score: 1.0,
                }),
            }
        }

        results.extend(hit_blocks.into_iter().map(|i| {
            let block = &blocks[i];
            SearchResult {
                file: path.clone(),
                kind: block.kind.clone(),
                name: block.name.clone(),
                start_line: block.start_line,
                end_line: block.end_line,
                content: block.content.clone(),
                score: 1.0,
            }
        }));
    }

    results.sort_by(|a, b| {
        a.file
            .cmp(&b.file)
            .then(a.start_line.cmp(&b.start_line))
    });
    results
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{LineExtractor, files};

    const SOURCE: &str = "import os  # TODO drop\n\ndef login(user):\n    # TODO hash\n    # TODO salt\n    return user\n\ndef logout():\n    pass\n";

    #[test]
    fn test_exact_match_reports_enclosing_blocks() {
        let set = files(&[("auth.py", SOURCE), ("math.py", "def add(a, b):\n    return a + b\n")]);
        let results = grep_blocks(&set, &Pattern::exact("TODO"), &mut LineExtractor);

        let summary: Vec<(&str, &str, usize)> = results
            .iter()
            .map(|r| (r.file.as_str(), r.name.as_str(), r.start_line))
            .collect();
        assert_eq!(
            summary,
            vec![("auth.py", "auth.py", 1), ("auth.py", "login", 3)]
        );
        assert_eq!(results[0].kind, LINE_KIND);
        assert_eq!(results[0].content, "import os  # TODO drop");
        assert_eq!(results[1].kind, "function");
        assert!(results.iter().all(|r| r.score == 1.0));
    }

    #[test]
    fn test_regex_match() {
        let set = files(&[("auth.py", SOURCE)]);
        let pattern = Pattern::regex(r"def log(in|out)\(").unwrap();
        let names: Vec<String> = grep_blocks(&set, &pattern, &mut LineExtractor)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["login", "logout"]);

        // Regex syntax is literal in exact mode
        assert!(grep_blocks(&set, &Pattern::exact("log(in|out)"), &mut LineExtractor).is_empty());
    }

    #[test]
    fn test_invalid_regex() {
        assert!(matches!(
            Pattern::regex("(unclosed"),
            Err(SiftError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_failed_extraction_falls_back_to_lines() {
        let set = files(&[("broken.py", "def f():\n    SYNTAX ERROR here\n")]);
        let results = grep_blocks(&set, &Pattern::exact("SYNTAX"), &mut LineExtractor);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, LINE_KIND);
        assert_eq!(results[0].start_line, 2);
    }
}
