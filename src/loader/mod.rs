//! Loads the text files of a repository snapshot.
//!
//! The README is looked up first and kept aside as the primary context for
//! every prompt. Discovery order is deterministic: the shallowest
//! `README.md` (any case) wins, and among files at the same depth the
//! lexicographically smallest path wins.

use crate::error::RagError;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directories never descended into
pub const IGNORED_DIRECTORIES: &[&str] = &[".git", "node_modules", "venv", "__pycache__"];

/// Lockfiles skipped even when their extension is supported
pub const IGNORED_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Gemfile.lock",
    "poetry.lock",
];

/// File name suffixes that are loaded. `Dockerfile` covers the
/// extensionless build file.
pub const SUPPORTED_SUFFIXES: &[&str] = &[
    ".py", ".js", ".ts", ".java", ".c", ".cpp", ".h", ".cs", ".go", ".html", ".css", ".scss",
    ".md", ".json", ".xml", ".yaml", ".yml", ".txt", "Dockerfile", ".sh",
];

const README_NAME: &str = "readme.md";

/// A text file loaded from a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the snapshot root
    pub path: PathBuf,
    pub content: String,
    pub encoding: &'static str,
}

/// Everything the loader extracts from one snapshot
#[derive(Debug, Clone, Default)]
pub struct LoadedRepository {
    pub documents: Vec<Document>,
    /// README text, empty when the repository has none
    pub readme: String,
}

impl LoadedRepository {
    pub fn has_readme(&self) -> bool {
        self.documents
            .first()
            .map_or(false, |doc| is_readme(&doc.path))
    }
}

/// Walk `root` and load every supported text file.
///
/// Unreadable files are logged and skipped. A tree with no matching files
/// yields an empty result rather than an error.
pub fn load(root: &Path) -> LoadedRepository {
    let mut loaded = LoadedRepository::default();

    if let Some(readme_path) = find_readme(root) {
        tracing::info!("Found README at: {}", readme_path.display());
        match read_document(root, &readme_path) {
            Ok(doc) => {
                loaded.readme = doc.content.clone();
                loaded.documents.push(doc);
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }

    for entry in walk(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if is_readme(entry.path()) || IGNORED_FILES.contains(&name.as_ref()) {
            continue;
        }
        if !is_supported(&name) {
            continue;
        }

        match read_document(root, entry.path()) {
            Ok(doc) => loaded.documents.push(doc),
            Err(e) => tracing::warn!("{}", e),
        }
    }

    tracing::info!(
        "Loaded {} documents from {} (README {})",
        loaded.documents.len(),
        root.display(),
        if loaded.has_readme() { "found" } else { "missing" }
    );
    loaded
}

/// Locate the README used as primary context.
pub fn find_readme(root: &Path) -> Option<PathBuf> {
    let mut best: Option<(usize, PathBuf)> = None;

    for entry in walk(root).filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || !is_readme(entry.path()) {
            continue;
        }
        // Sorted depth-first walk: the first hit at a given depth is the
        // lexicographically smallest one there.
        let shallower = best.as_ref().map_or(true, |(depth, _)| entry.depth() < *depth);
        if shallower {
            best = Some((entry.depth(), entry.into_path()));
        }
    }

    best.map(|(_, path)| path)
}

fn walk(root: &Path) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e))
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && IGNORED_DIRECTORIES.contains(&entry.file_name().to_string_lossy().as_ref())
}

fn is_readme(path: &Path) -> bool {
    path.file_name()
        .map_or(false, |name| name.to_string_lossy().to_lowercase() == README_NAME)
}

fn is_supported(file_name: &str) -> bool {
    SUPPORTED_SUFFIXES
        .iter()
        .any(|suffix| file_name.ends_with(suffix))
}

fn read_document(root: &Path, path: &Path) -> Result<Document, RagError> {
    let content = std::fs::read_to_string(path).map_err(|source| RagError::DocumentLoad {
        path: path.to_path_buf(),
        source,
    })?;

    let doc = Document {
        path: path.strip_prefix(root).unwrap_or(path).to_path_buf(),
        content,
        encoding: "utf-8",
    };
    tracing::debug!("Loaded {} ({})", doc.path.display(), doc.encoding);
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn paths(loaded: &LoadedRepository) -> Vec<String> {
        loaded
            .documents
            .iter()
            .map(|d| d.path.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_readme_only_repository() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", b"Hello world project.");

        let loaded = load(dir.path());
        assert_eq!(loaded.readme, "Hello world project.");
        assert_eq!(paths(&loaded), vec!["README.md"]);
        assert!(loaded.has_readme());
    }

    #[test]
    fn test_readme_is_never_loaded_twice() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "readme.MD", b"# Project");
        write(dir.path(), "docs/README.md", b"# Docs");
        write(dir.path(), "docs/guide.md", b"guide");

        let loaded = load(dir.path());
        assert_eq!(loaded.readme, "# Project");
        assert_eq!(paths(&loaded), vec!["readme.MD", "docs/guide.md"]);
    }

    #[test]
    fn test_shallowest_readme_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/README.md", b"nested a");
        write(dir.path(), "b/README.md", b"nested b");
        write(dir.path(), "a/deeper/README.md", b"deeper");

        assert_eq!(
            find_readme(dir.path()),
            Some(dir.path().join("a").join("README.md"))
        );

        write(dir.path(), "README.md", b"top");
        assert_eq!(find_readme(dir.path()), Some(dir.path().join("README.md")));
    }

    #[test]
    fn test_filters_directories_lockfiles_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.py", b"print('hi')");
        write(dir.path(), "Dockerfile", b"FROM scratch");
        write(dir.path(), "package.json", b"{}");
        write(dir.path(), "package-lock.json", b"{}");
        write(dir.path(), "node_modules/dep/index.js", b"module.exports = 1");
        write(dir.path(), ".git/config", b"[core]");
        write(dir.path(), "src/__pycache__/app.py", b"cached");
        write(dir.path(), "image.png", b"\x89PNG");
        write(dir.path(), "src/lib.rs", b"fn main() {}");

        let loaded = load(dir.path());
        assert_eq!(loaded.readme, "");
        assert_eq!(paths(&loaded), vec!["Dockerfile", "package.json", "src/app.py"]);
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.txt", b"fine");
        write(dir.path(), "bad.txt", &[0xff, 0xfe, 0x00, 0xd8]);

        let loaded = load(dir.path());
        assert_eq!(paths(&loaded), vec!["good.txt"]);
    }

    #[test]
    fn test_unreadable_readme_leaves_primary_context_empty() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", &[0xff, 0xfe, 0x00, 0xd8]);
        write(dir.path(), "a.py", b"print('a')");

        let loaded = load(dir.path());
        assert_eq!(loaded.readme, "");
        assert_eq!(paths(&loaded), vec!["a.py"]);
        assert!(!loaded.has_readme());
    }

    #[test]
    fn test_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(dir.path());
        assert!(loaded.documents.is_empty());
        assert!(loaded.readme.is_empty());
        assert!(!loaded.has_readme());
    }
}
