use std::path::Path;

use oc_core::ProjectId;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::IndexerError;

const SCHEMA_VERSION: u32 = 1;

/// Per-project, per-file record of what was indexed last, used by
/// [`crate::change_detector::ChangeDetector`] to decide whether a file is
/// new, modified, unchanged, or deleted without re-reading and re-hashing
/// every file on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndexState {
    pub relative_path: String,
    pub content_hash: String,
    pub size: u64,
    pub mtime_unix: i64,
    pub symbol_count: usize,
    pub indexed_at: String,
}

/// Status of the most recent indexing run for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectStatus {
    NeverIndexed,
    Indexing,
    Ready,
    Failed { reason: String },
}

impl ProjectStatus {
    fn as_db_str(&self) -> &'static str {
        match self {
            Self::NeverIndexed => "never_indexed",
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Aggregate file counts from the most recently completed run, as reported
/// by [`crate::coordinator::IndexCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectProgress {
    pub total_files: usize,
    pub indexed_files: usize,
    pub failed_files: usize,
}

/// Process-wide SQLite store tracking project registrations and per-file
/// index state, separate from each project's own graph/vector/full-text
/// databases. Lives at `<data_dir>/state.sqlite`.
pub struct ProjectStateStore {
    conn: Connection,
}

impl ProjectStateStore {
    pub fn open(data_dir: &Path) -> Result<Self, IndexerError> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join("state.sqlite"))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = 5000;\
             PRAGMA synchronous = NORMAL;\
             PRAGMA foreign_keys = ON;",
        )?;
        create_schema(&conn)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, IndexerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Register a project, recording it as never-indexed if new. No-op if
    /// already registered (root path is not updated, to avoid masking a
    /// stale-registration bug behind a silent rewrite).
    pub fn register_project(&self, project_id: ProjectId, root: &str) -> Result<(), IndexerError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO projects (id, root_path, status, registered_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                project_id.as_bytes().as_slice(),
                root,
                ProjectStatus::NeverIndexed.as_db_str(),
                oc_storage::graph::now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn set_status(&self, project_id: ProjectId, status: &ProjectStatus) -> Result<(), IndexerError> {
        let reason = match status {
            ProjectStatus::Failed { reason } => Some(reason.as_str()),
            _ => None,
        };
        self.conn.execute(
            "UPDATE projects SET status = ?2, status_reason = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                project_id.as_bytes().as_slice(),
                status.as_db_str(),
                reason,
                oc_storage::graph::now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_status(&self, project_id: ProjectId) -> Result<Option<ProjectStatus>, IndexerError> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT status, status_reason FROM projects WHERE id = ?1",
                params![project_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(status, reason)| match status.as_str() {
            "indexing" => ProjectStatus::Indexing,
            "ready" => ProjectStatus::Ready,
            "failed" => ProjectStatus::Failed {
                reason: reason.unwrap_or_default(),
            },
            _ => ProjectStatus::NeverIndexed,
        }))
    }

    /// Replace the recorded state for a file (insert or update).
    pub fn upsert_file_state(
        &self,
        project_id: ProjectId,
        state: &FileIndexState,
    ) -> Result<(), IndexerError> {
        self.conn.execute(
            "INSERT INTO file_index_states \
             (project_id, relative_path, content_hash, size, mtime_unix, symbol_count, indexed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(project_id, relative_path) DO UPDATE SET \
                content_hash = excluded.content_hash, \
                size = excluded.size, \
                mtime_unix = excluded.mtime_unix, \
                symbol_count = excluded.symbol_count, \
                indexed_at = excluded.indexed_at",
            params![
                project_id.as_bytes().as_slice(),
                state.relative_path,
                state.content_hash,
                state.size as i64,
                state.mtime_unix,
                state.symbol_count as i64,
                state.indexed_at,
            ],
        )?;
        self.log_change(project_id, &state.relative_path, "indexed")?;
        Ok(())
    }

    pub fn get_file_state(
        &self,
        project_id: ProjectId,
        relative_path: &str,
    ) -> Result<Option<FileIndexState>, IndexerError> {
        self.conn
            .query_row(
                "SELECT relative_path, content_hash, size, mtime_unix, symbol_count, indexed_at \
                 FROM file_index_states WHERE project_id = ?1 AND relative_path = ?2",
                params![project_id.as_bytes().as_slice(), relative_path],
                |row| {
                    Ok(FileIndexState {
                        relative_path: row.get(0)?,
                        content_hash: row.get(1)?,
                        size: row.get::<_, i64>(2)? as u64,
                        mtime_unix: row.get(3)?,
                        symbol_count: row.get::<_, i64>(4)? as usize,
                        indexed_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(IndexerError::from)
    }

    /// All tracked file states for a project, keyed by relative path — the
    /// baseline a [`crate::change_detector::ChangeDetector`] diffs a fresh
    /// walk against.
    pub fn all_file_states(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<FileIndexState>, IndexerError> {
        let mut stmt = self.conn.prepare(
            "SELECT relative_path, content_hash, size, mtime_unix, symbol_count, indexed_at \
             FROM file_index_states WHERE project_id = ?1",
        )?;
        let rows = stmt.query_map(params![project_id.as_bytes().as_slice()], |row| {
            Ok(FileIndexState {
                relative_path: row.get(0)?,
                content_hash: row.get(1)?,
                size: row.get::<_, i64>(2)? as u64,
                mtime_unix: row.get(3)?,
                symbol_count: row.get::<_, i64>(4)? as usize,
                indexed_at: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(IndexerError::from)
    }

    pub fn remove_file_state(
        &self,
        project_id: ProjectId,
        relative_path: &str,
    ) -> Result<(), IndexerError> {
        self.conn.execute(
            "DELETE FROM file_index_states WHERE project_id = ?1 AND relative_path = ?2",
            params![project_id.as_bytes().as_slice(), relative_path],
        )?;
        self.log_change(project_id, relative_path, "removed")?;
        Ok(())
    }

    /// Record aggregate file counts for a project after a run completes.
    pub fn record_progress(
        &self,
        project_id: ProjectId,
        total_files: usize,
        indexed_files: usize,
        failed_files: usize,
    ) -> Result<(), IndexerError> {
        self.conn.execute(
            "UPDATE projects SET total_files = ?2, indexed_files = ?3, failed_files = ?4, updated_at = ?5 \
             WHERE id = ?1",
            params![
                project_id.as_bytes().as_slice(),
                total_files as i64,
                indexed_files as i64,
                failed_files as i64,
                oc_storage::graph::now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_progress(&self, project_id: ProjectId) -> Result<Option<ProjectProgress>, IndexerError> {
        self.conn
            .query_row(
                "SELECT total_files, indexed_files, failed_files FROM projects WHERE id = ?1",
                params![project_id.as_bytes().as_slice()],
                |row| {
                    Ok(ProjectProgress {
                        total_files: row.get::<_, i64>(0)? as usize,
                        indexed_files: row.get::<_, i64>(1)? as usize,
                        failed_files: row.get::<_, i64>(2)? as usize,
                    })
                },
            )
            .optional()
            .map_err(IndexerError::from)
    }

    fn log_change(&self, project_id: ProjectId, relative_path: &str, action: &str) -> Result<(), IndexerError> {
        self.conn.execute(
            "INSERT INTO file_change_history (project_id, relative_path, action, occurred_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                project_id.as_bytes().as_slice(),
                relative_path,
                action,
                oc_storage::graph::now_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn create_schema(conn: &Connection) -> Result<(), IndexerError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS projects (
            id            BLOB PRIMARY KEY,
            root_path     TEXT NOT NULL,
            status        TEXT NOT NULL,
            status_reason TEXT,
            total_files   INTEGER NOT NULL DEFAULT 0,
            indexed_files INTEGER NOT NULL DEFAULT 0,
            failed_files  INTEGER NOT NULL DEFAULT 0,
            registered_at TEXT NOT NULL,
            updated_at    TEXT
         );

         CREATE TABLE IF NOT EXISTS file_index_states (
            project_id    BLOB NOT NULL,
            relative_path TEXT NOT NULL,
            content_hash  TEXT NOT NULL,
            size          INTEGER NOT NULL,
            mtime_unix    INTEGER NOT NULL,
            symbol_count  INTEGER NOT NULL,
            indexed_at    TEXT NOT NULL,
            PRIMARY KEY (project_id, relative_path)
         );

         CREATE TABLE IF NOT EXISTS file_change_history (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id    BLOB NOT NULL,
            relative_path TEXT NOT NULL,
            action        TEXT NOT NULL,
            occurred_at   TEXT NOT NULL
         );

         CREATE INDEX IF NOT EXISTS idx_file_change_history_project
            ON file_change_history(project_id, occurred_at);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state(path: &str) -> FileIndexState {
        FileIndexState {
            relative_path: path.to_string(),
            content_hash: "abc123".to_string(),
            size: 42,
            mtime_unix: 1_700_000_000,
            symbol_count: 3,
            indexed_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn register_and_read_status() {
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid = ProjectId::generate("/repo/a");
        store.register_project(pid, "/repo/a").unwrap();
        assert_eq!(store.get_status(pid).unwrap(), Some(ProjectStatus::NeverIndexed));

        store.set_status(pid, &ProjectStatus::Ready).unwrap();
        assert_eq!(store.get_status(pid).unwrap(), Some(ProjectStatus::Ready));
    }

    #[test]
    fn register_is_idempotent() {
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid = ProjectId::generate("/repo/a");
        store.register_project(pid, "/repo/a").unwrap();
        store.set_status(pid, &ProjectStatus::Ready).unwrap();
        store.register_project(pid, "/repo/a").unwrap();
        assert_eq!(store.get_status(pid).unwrap(), Some(ProjectStatus::Ready));
    }

    #[test]
    fn upsert_and_fetch_file_state() {
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid = ProjectId::generate("/repo/a");
        let state = sample_state("src/main.rs");
        store.upsert_file_state(pid, &state).unwrap();

        let fetched = store.get_file_state(pid, "src/main.rs").unwrap().unwrap();
        assert_eq!(fetched, state);
    }

    #[test]
    fn upsert_overwrites_existing() {
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid = ProjectId::generate("/repo/a");
        store.upsert_file_state(pid, &sample_state("a.rs")).unwrap();
        let mut updated = sample_state("a.rs");
        updated.content_hash = "def456".to_string();
        store.upsert_file_state(pid, &updated).unwrap();

        let fetched = store.get_file_state(pid, "a.rs").unwrap().unwrap();
        assert_eq!(fetched.content_hash, "def456");
    }

    #[test]
    fn all_file_states_scoped_per_project() {
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid_a = ProjectId::generate("/repo/a");
        let pid_b = ProjectId::generate("/repo/b");
        store.upsert_file_state(pid_a, &sample_state("a.rs")).unwrap();
        store.upsert_file_state(pid_b, &sample_state("b.rs")).unwrap();

        let states = store.all_file_states(pid_a).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].relative_path, "a.rs");
    }

    #[test]
    fn record_and_read_progress() {
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid = ProjectId::generate("/repo/a");
        store.register_project(pid, "/repo/a").unwrap();
        assert_eq!(store.get_progress(pid).unwrap(), Some(ProjectProgress {
            total_files: 0,
            indexed_files: 0,
            failed_files: 0,
        }));

        store.record_progress(pid, 10, 9, 1).unwrap();
        assert_eq!(store.get_progress(pid).unwrap(), Some(ProjectProgress {
            total_files: 10,
            indexed_files: 9,
            failed_files: 1,
        }));
    }

    #[test]
    fn remove_file_state_deletes_row() {
        let store = ProjectStateStore::open_in_memory().unwrap();
        let pid = ProjectId::generate("/repo/a");
        store.upsert_file_state(pid, &sample_state("a.rs")).unwrap();
        store.remove_file_state(pid, "a.rs").unwrap();
        assert!(store.get_file_state(pid, "a.rs").unwrap().is_none());
    }
}
