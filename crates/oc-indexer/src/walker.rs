use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ignore::WalkBuilder;

use crate::scanner::is_generated_file;

/// One file or directory entry surfaced by a [`FileWalker`] pass.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Path relative to the project root (forward-slash normalized).
    pub relative_path: PathBuf,
    pub is_directory: bool,
    /// File size in bytes; 0 for directories.
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Lazy, iterator-based directory walk. Thin wrapper around
/// [`ignore::WalkBuilder`] that defers all ignore-rule decisions to the
/// caller instead of baking vendor/generated-file filtering in, so a
/// [`crate::ignore_rules::IgnoreRuleSet`] can be layered on top.
///
/// [`crate::scanner::scan_files`] remains the eager one-shot consumer built
/// from this primitive for callers that just want a flat file list.
pub struct FileWalker {
    root: PathBuf,
    follow_links: bool,
}

impl FileWalker {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            follow_links: false,
        }
    }

    pub fn follow_links(mut self, yes: bool) -> Self {
        self.follow_links = yes;
        self
    }

    /// Walk the tree, yielding every entry the underlying `ignore` walker
    /// produces (errors from individual entries, e.g. permission denied,
    /// are silently skipped rather than aborting the whole walk).
    pub fn walk(&self) -> impl Iterator<Item = WalkEntry> + '_ {
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(self.follow_links)
            .build();

        walker.filter_map(move |entry| {
            let entry = entry.ok()?;
            let ft = entry.file_type()?;
            let relative_path = entry.path().strip_prefix(&self.root).ok()?.to_path_buf();
            let metadata = entry.metadata().ok();
            Some(WalkEntry {
                relative_path,
                is_directory: ft.is_dir(),
                size: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
                modified: metadata.and_then(|m| m.modified().ok()),
            })
        })
    }

    /// Convenience filter: files only, skipping the built-in generated-file
    /// patterns [`crate::scanner`] uses.
    pub fn walk_source_files(&self) -> impl Iterator<Item = WalkEntry> + '_ {
        self.walk()
            .filter(|e| !e.is_directory)
            .filter(|e| !is_generated_file(&e.relative_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walks_files_and_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/main.rs"), "fn main() {}").unwrap();

        let entries: Vec<_> = FileWalker::new(tmp.path()).walk().collect();
        assert!(entries.iter().any(|e| e.is_directory && e.relative_path == Path::new("src")));
        assert!(entries
            .iter()
            .any(|e| !e.is_directory && e.relative_path == Path::new("src/main.rs")));
    }

    #[test]
    fn walk_source_files_skips_generated() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("app.py"), "x = 1").unwrap();
        fs::write(tmp.path().join("schema.generated.ts"), "export {}").unwrap();

        let files: Vec<_> = FileWalker::new(tmp.path()).walk_source_files().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, Path::new("app.py"));
    }

    #[test]
    fn reports_file_size() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "hello").unwrap();
        let entries: Vec<_> = FileWalker::new(tmp.path()).walk_source_files().collect();
        assert_eq!(entries[0].size, 5);
    }
}
