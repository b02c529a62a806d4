use std::collections::HashSet;
use std::path::Path;

use oc_core::ProjectId;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::IndexerError;
use crate::project_state::{FileIndexState, ProjectStateStore};
use crate::walker::FileWalker;

/// Classification of one file relative to the last recorded
/// [`FileIndexState`] for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Added { relative_path: String },
    Modified { relative_path: String },
    Removed { relative_path: String },
}

impl FileChange {
    pub fn relative_path(&self) -> &str {
        match self {
            Self::Added { relative_path }
            | Self::Modified { relative_path }
            | Self::Removed { relative_path } => relative_path,
        }
    }
}

/// Diffs a fresh directory walk against [`ProjectStateStore`]'s recorded
/// baseline to classify which files actually need re-parsing, instead of
/// re-hashing and re-parsing every file on every incremental pass.
///
/// A changed-size or changed-mtime file is still content-hashed before
/// being called `Modified` — mtime/size alone can't be trusted (checkouts,
/// rsync, and some editors rewrite a file with identical content).
pub struct ChangeDetector<'a> {
    state: &'a ProjectStateStore,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(state: &'a ProjectStateStore) -> Self {
        Self { state }
    }

    pub fn detect(
        &self,
        project_id: ProjectId,
        project_root: &Path,
    ) -> Result<Vec<FileChange>, IndexerError> {
        let baseline = self.state.all_file_states(project_id)?;
        let mut baseline_paths: HashSet<String> =
            baseline.iter().map(|s| s.relative_path.clone()).collect();

        let mut changes = Vec::new();

        for entry in FileWalker::new(project_root).walk_source_files() {
            let rel = entry.relative_path.to_string_lossy().replace('\\', "/");
            let existing = self.state.get_file_state(project_id, &rel)?;

            match existing {
                None => changes.push(FileChange::Added { relative_path: rel }),
                Some(prior) => {
                    baseline_paths.remove(&rel);
                    if self.content_changed(project_root, &rel, &prior)? {
                        changes.push(FileChange::Modified { relative_path: rel });
                    }
                }
            }
        }

        for leftover in baseline_paths {
            changes.push(FileChange::Removed {
                relative_path: leftover,
            });
        }

        Ok(changes)
    }

    fn content_changed(
        &self,
        project_root: &Path,
        relative_path: &str,
        prior: &FileIndexState,
    ) -> Result<bool, IndexerError> {
        let full_path = project_root.join(relative_path);
        let content = match std::fs::read(&full_path) {
            Ok(c) => c,
            Err(_) => return Ok(true),
        };
        let hash = format!("{:016x}", xxh3_64(&content));
        Ok(hash != prior.content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn hash_of(content: &[u8]) -> String {
        format!("{:016x}", xxh3_64(content))
    }

    #[test]
    fn new_file_detected_as_added() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "x = 1").unwrap();
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid = ProjectId::generate(tmp.path().to_str().unwrap());

        let changes = ChangeDetector::new(&store).detect(pid, tmp.path()).unwrap();
        assert_eq!(changes, vec![FileChange::Added { relative_path: "a.py".to_string() }]);
    }

    #[test]
    fn unchanged_file_produces_no_change() {
        let tmp = tempfile::TempDir::new().unwrap();
        let content = b"x = 1";
        fs::write(tmp.path().join("a.py"), content).unwrap();
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid = ProjectId::generate(tmp.path().to_str().unwrap());
        store
            .upsert_file_state(
                pid,
                &FileIndexState {
                    relative_path: "a.py".to_string(),
                    content_hash: hash_of(content),
                    size: content.len() as u64,
                    mtime_unix: 0,
                    symbol_count: 1,
                    indexed_at: "2026-01-01T00:00:00Z".to_string(),
                },
            )
            .unwrap();

        let changes = ChangeDetector::new(&store).detect(pid, tmp.path()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn modified_content_detected() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "x = 2").unwrap();
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid = ProjectId::generate(tmp.path().to_str().unwrap());
        store
            .upsert_file_state(
                pid,
                &FileIndexState {
                    relative_path: "a.py".to_string(),
                    content_hash: hash_of(b"x = 1"),
                    size: 5,
                    mtime_unix: 0,
                    symbol_count: 1,
                    indexed_at: "2026-01-01T00:00:00Z".to_string(),
                },
            )
            .unwrap();

        let changes = ChangeDetector::new(&store).detect(pid, tmp.path()).unwrap();
        assert_eq!(changes, vec![FileChange::Modified { relative_path: "a.py".to_string() }]);
    }

    #[test]
    fn deleted_file_reported_as_removed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid = ProjectId::generate(tmp.path().to_str().unwrap());
        store
            .upsert_file_state(
                pid,
                &FileIndexState {
                    relative_path: "gone.py".to_string(),
                    content_hash: hash_of(b"x = 1"),
                    size: 5,
                    mtime_unix: 0,
                    symbol_count: 1,
                    indexed_at: "2026-01-01T00:00:00Z".to_string(),
                },
            )
            .unwrap();

        let changes = ChangeDetector::new(&store).detect(pid, tmp.path()).unwrap();
        assert_eq!(changes, vec![FileChange::Removed { relative_path: "gone.py".to_string() }]);
    }
}
