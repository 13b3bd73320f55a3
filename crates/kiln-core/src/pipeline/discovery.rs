//! Source discovery: finding a stage's input files.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Discovers source files below a directory.
#[derive(Debug, Clone)]
pub struct SourceDiscovery {
    /// Lowercase extensions to accept; empty accepts every file
    extensions: Vec<String>,
    /// `Some(1)` limits discovery to the directory itself
    max_depth: Option<usize>,
    /// Skip Sass partials (`_name.scss`)
    skip_partials: bool,
}

/// Information about a discovered file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Full path to the file
    pub path: PathBuf,
    /// Path relative to the discovery root
    pub relative: PathBuf,
    /// File size in bytes
    pub size: u64,
}

impl SourceDiscovery {
    /// Create a discovery that accepts the given extensions (case-insensitive).
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
            max_depth: None,
            skip_partials: false,
        }
    }

    /// Accept every regular file.
    pub fn any() -> Self {
        Self::new::<&str>(&[])
    }

    /// Only look at files directly inside the root.
    pub fn non_recursive(mut self) -> Self {
        self.max_depth = Some(1);
        self
    }

    /// Ignore files whose name starts with `_`.
    pub fn skip_partials(mut self) -> Self {
        self.skip_partials = true;
        self
    }

    /// Discover all matching files below `root`, sorted by path.
    ///
    /// A missing root is not an error: a project without scripts simply has
    /// nothing for the scripts stage to do.
    pub fn discover(&self, root: &Path) -> Vec<DiscoveredFile> {
        if !root.is_dir() {
            tracing::debug!("Source directory {:?} does not exist, nothing to do", root);
            return vec![];
        }

        let mut walker = WalkDir::new(root).follow_links(true);
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut files = Vec::new();
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            let entry_path = entry.path();
            if !entry.file_type().is_file() || !self.accepts(entry_path) {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                let relative = entry_path
                    .strip_prefix(root)
                    .unwrap_or(entry_path)
                    .to_path_buf();
                files.push(DiscoveredFile {
                    path: entry_path.to_path_buf(),
                    relative,
                    size: meta.len(),
                });
            }
        }

        // Sort by path for deterministic ordering
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Check if a file passes the extension and partial filters.
    pub fn accepts(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with('.') {
            return false;
        }
        if self.skip_partials && name.starts_with('_') {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext_lower = ext.to_lowercase();
                self.extensions.iter().any(|e| *e == ext_lower)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, rel).unwrap();
    }

    #[test]
    fn test_accepts_extensions_case_insensitive() {
        let discovery = SourceDiscovery::new(&["scss"]);
        assert!(discovery.accepts(Path::new("main.scss")));
        assert!(discovery.accepts(Path::new("MAIN.SCSS")));
        assert!(!discovery.accepts(Path::new("main.css")));
        assert!(!discovery.accepts(Path::new(".hidden.scss")));
    }

    #[test]
    fn test_skip_partials() {
        let discovery = SourceDiscovery::new(&["scss"]).skip_partials();
        assert!(!discovery.accepts(Path::new("_variables.scss")));
        assert!(discovery.accepts(Path::new("main.scss")));
    }

    #[test]
    fn test_discover_sorted_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.js");
        touch(dir.path(), "a.js");
        touch(dir.path(), "vendor/z.js");
        touch(dir.path(), "notes.txt");

        let files = SourceDiscovery::new(&["js"]).discover(dir.path());
        let rel: Vec<_> = files.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("a.js"),
                PathBuf::from("b.js"),
                PathBuf::from("vendor/z.js")
            ]
        );
        assert_eq!(files[2].size, 11);
    }

    #[test]
    fn test_non_recursive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "index.html");
        touch(dir.path(), "assets/partial.html");

        let files = SourceDiscovery::new(&["html"])
            .non_recursive()
            .discover(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, PathBuf::from("index.html"));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = SourceDiscovery::any().discover(&dir.path().join("nope"));
        assert!(files.is_empty());
    }
}
