//! Query the index

use serde::Serialize;

use crate::{Embed, Extract, Neighbor, Result, SemanticIndex, SiftError, VectorStore};

/// Search result with block metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub file: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    /// Similarity in `[0, 1]`, higher is closer
    pub score: f32,
}

impl From<Neighbor> for SearchResult {
    fn from(neighbor: Neighbor) -> Self {
        let payload = neighbor.payload;
        Self {
            file: payload.file,
            kind: payload.kind,
            name: payload.name,
            start_line: payload.start_line,
            end_line: payload.end_line,
            content: payload.content,
            score: similarity_from_distance(neighbor.distance),
        }
    }
}

/// Map a cosine distance in `[0, 2]` to a similarity in `[0, 1]`.
pub fn similarity_from_distance(distance: f32) -> f32 {
    ((2.0 - distance) / 2.0).clamp(0.0, 1.0)
}

/// Keep results scoring at least `min_score`, preserving order.
pub fn filter_by_threshold(results: Vec<SearchResult>, min_score: f32) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| r.score >= min_score)
        .collect()
}

/// Whether root-relative `file` lies in directory `dir` (or is `dir` itself).
pub fn in_dir(file: &str, dir: &str) -> bool {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        return true;
    }
    file.strip_prefix(dir)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

impl<E: Embed, S: VectorStore, X: Extract> SemanticIndex<E, S, X> {
    /// Embed `query`, or `None` when the root has not been indexed yet.
    fn query_vector(&mut self, query: &str, k: usize) -> Result<Option<Vec<f32>>> {
        if k == 0 {
            return Err(SiftError::InvalidArgument(
                "Result limit must be at least 1".to_string(),
            ));
        }
        if !self.is_indexed() {
            tracing::debug!("No index at {}, nothing to search", self.root().display());
            return Ok(None);
        }

        self.check_model(&self.manifest())?;
        self.embed_query(query).map(Some)
    }

    /// The `k` blocks closest to `query`, best first.
    ///
    /// Returns nothing when the root has not been indexed yet.
    pub fn search(&mut self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let Some(vector) = self.query_vector(query, k)? else {
            return Ok(Vec::new());
        };

        let neighbors = self.store()?.search(vector, k)?;
        tracing::debug!("Found {} results for {:?}", neighbors.len(), query);

        Ok(neighbors.into_iter().map(SearchResult::from).collect())
    }

    /// Like [`SemanticIndex::search`], limited to files under the root-relative
    /// directory `dir`.
    ///
    /// The store has no path filter, so the candidate pool grows until `k`
    /// results fall inside `dir` or every vector has been considered.
    pub fn search_in(&mut self, query: &str, k: usize, dir: &str) -> Result<Vec<SearchResult>> {
        if dir.trim_matches('/').is_empty() {
            return self.search(query, k);
        }
        let Some(vector) = self.query_vector(query, k)? else {
            return Ok(Vec::new());
        };

        let store = self.store()?;
        let total = store.count()?;
        let mut fetch = k;
        loop {
            let results: Vec<SearchResult> = store
                .search(vector.clone(), fetch)?
                .into_iter()
                .map(SearchResult::from)
                .filter(|r| in_dir(&r.file, dir))
                .take(k)
                .collect();

            if results.len() >= k || fetch >= total {
                tracing::debug!("Found {} results under {} for {:?}", results.len(), dir, query);
                return Ok(results);
            }
            fetch = fetch.saturating_mul(4).min(total);
        }
    }

    /// Like [`SemanticIndex::search`], dropping results below `min_score`.
    pub fn search_with_threshold(
        &mut self,
        query: &str,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        Ok(filter_by_threshold(self.search(query, k)?, min_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{files, test_index};

    fn result(name: &str, score: f32) -> SearchResult {
        SearchResult {
            file: "a.py".into(),
            kind: "function".into(),
            name: name.into(),
            start_line: 1,
            end_line: 2,
            content: String::new(),
            score,
        }
    }

    #[test]
    fn test_similarity_from_distance() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert_eq!(similarity_from_distance(2.0), 0.0);
        assert_eq!(similarity_from_distance(1.0), 0.5);
        // Float noise stays inside the range
        assert_eq!(similarity_from_distance(-0.0001), 1.0);
        assert_eq!(similarity_from_distance(2.0001), 0.0);
    }

    #[test]
    fn test_filter_by_threshold() {
        let results = vec![result("a", 0.9), result("b", 0.6), result("c", 0.3)];
        let names: Vec<String> = filter_by_threshold(results, 0.5)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_search_finds_login() {
        let temp = tempfile::tempdir().unwrap();
        let mut index = test_index(temp.path(), 128);
        index
            .index(&files(&[
                (
                    "auth.py",
                    "def login(user, password):\n    # authentication check\n    return check(user, password)\n",
                ),
                ("math.py", "def add(a, b):\n    return a + b\n"),
            ]))
            .unwrap();

        let results = index.search("login user password authentication", 5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "login");
        assert_eq!(results[0].file, "auth.py");
        assert_eq!(results[0].kind, "function");
        assert_eq!((results[0].start_line, results[0].end_line), (1, 3));
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));

        index.clear().unwrap();
        assert!(index.search("authentication", 5).unwrap().is_empty());
    }

    #[test]
    fn test_identical_text_scores_high() {
        let temp = tempfile::tempdir().unwrap();
        let mut index = test_index(temp.path(), 128);
        let content = "def parse_config(path):\n    return load(path)\n";
        index.index(&files(&[("config.py", content)])).unwrap();

        let query = format!("function parse_config\n{}", content.trim_end());
        let results = index.search(&query, 1).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score >= 0.99);
    }

    #[test]
    fn test_k_limits_results() {
        let temp = tempfile::tempdir().unwrap();
        let mut index = test_index(temp.path(), 128);
        index
            .index(&files(&[(
                "ops.py",
                "def a():\n    pass\ndef b():\n    pass\ndef c():\n    pass\n",
            )]))
            .unwrap();

        assert_eq!(index.search("pass", 2).unwrap().len(), 2);
        assert!(matches!(
            index.search("pass", 0),
            Err(SiftError::InvalidArgument(_))
        ));
        assert!(
            index
                .search_with_threshold("pass", 3, 1.1)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_in_dir() {
        assert!(in_dir("src/auth.py", "src"));
        assert!(in_dir("src/auth.py", "src/"));
        assert!(in_dir("src/auth.py", "src/auth.py"));
        assert!(in_dir("lib/b.py", ""));
        assert!(!in_dir("srcx/auth.py", "src"));
        assert!(!in_dir("lib/src/auth.py", "src"));
    }

    #[test]
    fn test_search_in_subdirectory() {
        let temp = tempfile::tempdir().unwrap();
        let mut index = test_index(temp.path(), 128);
        index
            .index(&files(&[
                ("lib/session.py", "def login(user, password):\n    return user\n"),
                ("lib/token.py", "def refresh(user, password):\n    return user\n"),
                ("src/app.py", "def main():\n    run()\n"),
                ("src/cli.py", "def parse(args):\n    return args\n"),
                ("srcx/extra.py", "def login(user):\n    pass\n"),
            ]))
            .unwrap();

        // The best matches live in lib/, yet only src/ results come back
        let results = index.search_in("login user password", 1, "src").unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].file.starts_with("src/"));

        let results = index.search_in("login user password", 10, "src").unwrap();
        let mut found: Vec<&str> = results.iter().map(|r| r.file.as_str()).collect();
        found.sort();
        assert_eq!(found, vec!["src/app.py", "src/cli.py"]);

        assert_eq!(index.search_in("login", 10, "").unwrap().len(), 5);
        assert!(index.search_in("login", 10, "docs").unwrap().is_empty());
    }

    #[test]
    fn test_search_unindexed_root() {
        let temp = tempfile::tempdir().unwrap();
        let mut index = test_index(temp.path(), 128);
        assert!(index.search("anything", 10).unwrap().is_empty());
        assert!(!crate::discover::index_dir(temp.path()).exists());
    }
}
