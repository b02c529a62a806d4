use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use oc_core::{PerformanceMonitor, ProjectId};
use oc_storage::manager::StorageManager;

use crate::change_detector::{ChangeDetector, FileChange};
use crate::error::IndexerError;
use crate::pipeline::{self, IncrementalIndexResult};
use crate::project_state::{FileIndexState, ProjectStateStore, ProjectStatus};
use crate::report::{IndexConfig, IndexReport};
use crate::resource_guard::{MemoryPressureTier, ResourceGuard};
use crate::watcher::{start_watching, WatcherHandle};

/// Lifecycle state of one project's indexing run.
///
/// `Idle → Enumerating → Hashing → Parsing → Writing → Verifying → Ready`,
/// with `Error` reachable from any stage. The pipeline itself runs these
/// stages inline (scan, then parse-in-parallel, then sequential store); this
/// wrapper just makes the stage externally observable for status reporting
/// instead of leaving callers to infer progress from nothing until the
/// whole run returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Enumerating,
    Hashing,
    Parsing,
    Writing,
    Verifying,
    Ready,
    Error,
}

/// Drives a single project's `pipeline::index`/`index_incremental` calls
/// and exposes the current stage plus a running error count, so a caller
/// polling status doesn't have to block on the whole run completing.
///
/// Optionally wired to a [`ProjectStateStore`] via [`Self::with_state_store`]:
/// when present, every run persists per-file state and aggregate progress
/// durably (so status survives a process restart) and [`Self::detect_changes`]
/// becomes available. Without one, the coordinator behaves as pure in-memory
/// stage/error tracking, same as before this existed.
pub struct IndexCoordinator {
    project_root: PathBuf,
    project_id: ProjectId,
    state: Mutex<CoordinatorState>,
    errors_seen: AtomicU64,
    runs_completed: AtomicUsize,
    state_store: Option<Arc<ProjectStateStore>>,
    resource_guard: Option<Arc<ResourceGuard>>,
    perf: Option<Arc<PerformanceMonitor>>,
}

impl IndexCoordinator {
    pub fn new(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            project_id: ProjectId::generate(&project_root.to_string_lossy()),
            state: Mutex::new(CoordinatorState::Idle),
            errors_seen: AtomicU64::new(0),
            runs_completed: AtomicUsize::new(0),
            state_store: None,
            resource_guard: None,
            perf: None,
        }
    }

    /// Attach a [`ProjectStateStore`] under the given `project_id` so runs
    /// persist durably instead of only updating the in-process atomics.
    pub fn with_state_store(mut self, project_id: ProjectId, state_store: Arc<ProjectStateStore>) -> Self {
        self.project_id = project_id;
        self.state_store = Some(state_store);
        self
    }

    /// Attach a [`ResourceGuard`] so runs check memory pressure before
    /// starting and shrink their worker pool / batch size under `Emergency`
    /// tier, and so the error threshold it tracks feeds back into the
    /// pipeline's degraded-mode language detection and chunking.
    pub fn with_resource_guard(mut self, resource_guard: Arc<ResourceGuard>) -> Self {
        self.resource_guard = Some(resource_guard);
        self
    }

    /// Attach a [`PerformanceMonitor`] so each run's wall-clock duration is
    /// recorded under `"index_full"`/`"index_incremental"` for later
    /// summary/threshold reporting. Pure observation: never influences
    /// whether or how a run proceeds.
    pub fn with_performance_monitor(mut self, perf: Arc<PerformanceMonitor>) -> Self {
        self.perf = Some(perf);
        self
    }

    /// Produce a config to actually run with: under `Emergency` memory
    /// pressure, shrink the parallel parse pool and SQLite batch size so the
    /// run has a chance to finish inside the available headroom instead of
    /// OOMing partway through. Any tier below `Emergency` runs unmodified.
    fn pressure_adjusted_config(&self, config: &IndexConfig) -> IndexConfig {
        let Some(guard) = &self.resource_guard else {
            return config.clone();
        };
        let tier = guard.check_memory();
        if guard.poll_memory_pressure_event() {
            tracing::warn!(project = %self.project_id, "memory pressure event latched");
        }
        if tier != MemoryPressureTier::Emergency {
            return config.clone();
        }
        let mut adjusted = config.clone();
        adjusted.worker_pool_size = (adjusted.worker_pool_size / 2).max(1);
        adjusted.batch_size = (adjusted.batch_size / 2).max(1);
        tracing::warn!(
            project = %self.project_id,
            worker_pool_size = adjusted.worker_pool_size,
            batch_size = adjusted.batch_size,
            "emergency memory pressure, shrinking index run"
        );
        adjusted
    }

    /// Diff the project's current files against the last-synced baseline in
    /// the attached `ProjectStateStore`, without touching the graph/fulltext
    /// stores. Lets a caller check whether `run_incremental` is worth
    /// triggering, or report pending changes without running a pass. Returns
    /// an empty list if no store is attached.
    pub fn detect_changes(&self) -> Result<Vec<FileChange>, IndexerError> {
        match &self.state_store {
            Some(state) => ChangeDetector::new(state).detect(self.project_id, &self.project_root),
            None => Ok(Vec::new()),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.lock().expect("coordinator state lock poisoned")
    }

    pub fn errors_seen(&self) -> u64 {
        self.errors_seen.load(Ordering::Relaxed)
    }

    pub fn runs_completed(&self) -> usize {
        self.runs_completed.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: CoordinatorState) {
        *self.state.lock().expect("coordinator state lock poisoned") = state;
    }

    fn record_duration(&self, op: &str, started: std::time::Instant) {
        if let Some(perf) = &self.perf {
            perf.record_operation(op, started.elapsed().as_secs_f64() * 1000.0);
        }
    }

    /// Run a full index. `pipeline::index` performs enumerate/hash/parse/
    /// write internally in one call; the stage transitions recorded here
    /// bracket that call rather than tracking it mid-flight, since the
    /// pipeline doesn't yet report intermediate progress.
    pub fn run_full(&self, config: &IndexConfig) -> Result<IndexReport, IndexerError> {
        self.mark_indexing();
        self.set_state(CoordinatorState::Enumerating);
        self.set_state(CoordinatorState::Hashing);
        self.set_state(CoordinatorState::Parsing);
        self.set_state(CoordinatorState::Writing);
        let config = self.pressure_adjusted_config(config);
        let started = std::time::Instant::now();
        let result = pipeline::index(&self.project_root, &config, self.resource_guard.as_deref());
        self.record_duration("index_full", started);
        self.set_state(CoordinatorState::Verifying);
        match result {
            Ok(report) => {
                self.runs_completed.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.sync_after_run(&config, &report) {
                    self.errors_seen.fetch_add(1, Ordering::Relaxed);
                    self.set_state(CoordinatorState::Error);
                    self.mark_failed(&e.to_string());
                    return Err(e);
                }
                self.set_state(CoordinatorState::Ready);
                Ok(report)
            }
            Err(e) => {
                self.errors_seen.fetch_add(1, Ordering::Relaxed);
                self.set_state(CoordinatorState::Error);
                self.mark_failed(&e.to_string());
                Err(e)
            }
        }
    }

    pub fn run_incremental(
        &self,
        config: &IndexConfig,
    ) -> Result<IncrementalIndexResult, IndexerError> {
        self.mark_indexing();
        self.set_state(CoordinatorState::Hashing);
        self.set_state(CoordinatorState::Parsing);
        self.set_state(CoordinatorState::Writing);
        let config = self.pressure_adjusted_config(config);
        let started = std::time::Instant::now();
        let result = pipeline::index_incremental(&self.project_root, &config, self.resource_guard.as_deref());
        self.record_duration("index_incremental", started);
        self.set_state(CoordinatorState::Verifying);
        match result {
            Ok(result) => {
                self.runs_completed.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.sync_after_run(&config, &result.report) {
                    self.errors_seen.fetch_add(1, Ordering::Relaxed);
                    self.set_state(CoordinatorState::Error);
                    self.mark_failed(&e.to_string());
                    return Err(e);
                }
                self.set_state(CoordinatorState::Ready);
                Ok(result)
            }
            Err(e) => {
                self.errors_seen.fetch_add(1, Ordering::Relaxed);
                self.set_state(CoordinatorState::Error);
                self.mark_failed(&e.to_string());
                Err(e)
            }
        }
    }

    fn mark_indexing(&self) {
        if let Some(state) = &self.state_store {
            let _ = state.register_project(self.project_id, &self.project_root.to_string_lossy());
            let _ = state.set_status(self.project_id, &ProjectStatus::Indexing);
        }
    }

    fn mark_failed(&self, reason: &str) {
        if let Some(state) = &self.state_store {
            let _ = state.set_status(
                self.project_id,
                &ProjectStatus::Failed {
                    reason: reason.to_string(),
                },
            );
        }
    }

    /// Persist per-file state and aggregate progress to the attached
    /// `ProjectStateStore` after a run succeeds. Reads back what the run
    /// just wrote to the graph store rather than re-deriving it, since
    /// `GraphStore`'s `files` table is already the authoritative per-file
    /// record (path, content hash, size, symbol count) the pipeline
    /// produced. A no-op if no store is attached.
    fn sync_after_run(&self, config: &IndexConfig, report: &IndexReport) -> Result<(), IndexerError> {
        let Some(state) = &self.state_store else {
            return Ok(());
        };

        let storage = StorageManager::open_with_dimension(&self.project_root, config.embedding_dim)?;
        let known_paths = storage
            .graph()
            .list_files()
            .map_err(|e| IndexerError::PipelineFailed {
                stage: "sync_state_store".to_string(),
                reason: e.to_string(),
            })?;
        let known: HashSet<&str> = known_paths.iter().map(|s| s.as_str()).collect();

        for prior in state.all_file_states(self.project_id)? {
            if !known.contains(prior.relative_path.as_str()) {
                state.remove_file_state(self.project_id, &prior.relative_path)?;
            }
        }

        for path in &known_paths {
            let meta = storage
                .graph()
                .get_file(path)
                .map_err(|e| IndexerError::PipelineFailed {
                    stage: "sync_state_store".to_string(),
                    reason: e.to_string(),
                })?;
            let Some(meta) = meta else { continue };

            let mtime_unix = std::fs::metadata(self.project_root.join(path))
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            state.upsert_file_state(
                self.project_id,
                &FileIndexState {
                    relative_path: path.clone(),
                    content_hash: format!("{:016x}", meta.content_hash),
                    size: meta.size_bytes,
                    mtime_unix,
                    symbol_count: meta.symbol_count as usize,
                    indexed_at: meta.last_indexed.clone(),
                },
            )?;
        }

        state.record_progress(
            self.project_id,
            report.total_files_scanned,
            report.files_indexed,
            report.files_failed,
        )?;
        state.set_status(self.project_id, &ProjectStatus::Ready)?;
        Ok(())
    }
}

/// Snapshot of a [`HotReloadController`]'s state, suitable for exposing
/// over a status endpoint.
#[derive(Debug, Clone)]
pub struct HotReloadStatus {
    pub enabled: bool,
    pub changes_detected: u64,
    pub errors_count: u64,
    pub last_enabled: Option<String>,
    pub last_disabled: Option<String>,
}

/// Wraps [`WatcherHandle`] with the bookkeeping a hot-reload status surface
/// needs: whether it's currently running, how many changes it has seen, and
/// timestamps of the last enable/disable transitions.
pub struct HotReloadController {
    project_root: PathBuf,
    handle: Mutex<Option<WatcherHandle>>,
    changes_detected: AtomicU64,
    errors_count: AtomicU64,
    last_enabled: Mutex<Option<String>>,
    last_disabled: Mutex<Option<String>>,
}

impl HotReloadController {
    pub fn new(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            handle: Mutex::new(None),
            changes_detected: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            last_enabled: Mutex::new(None),
            last_disabled: Mutex::new(None),
        }
    }

    pub fn enable(&self) -> Result<(), IndexerError> {
        let mut slot = self.handle.lock().expect("watcher handle lock poisoned");
        if slot.is_some() {
            return Ok(());
        }
        let handle = start_watching(&self.project_root)?;
        *slot = Some(handle);
        *self.last_enabled.lock().expect("timestamp lock poisoned") =
            Some(oc_storage::graph::now_rfc3339());
        Ok(())
    }

    pub fn disable(&self) {
        let mut slot = self.handle.lock().expect("watcher handle lock poisoned");
        if let Some(handle) = slot.take() {
            let events = handle.stop();
            self.changes_detected
                .fetch_add(events.len() as u64, Ordering::Relaxed);
        }
        *self.last_disabled.lock().expect("timestamp lock poisoned") =
            Some(oc_storage::graph::now_rfc3339());
    }

    pub fn record_processed(&self, results: &[Result<crate::incremental::IncrementalReport, IndexerError>]) {
        for result in results {
            match result {
                Ok(_) => {
                    self.changes_detected.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    self.errors_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn status(&self) -> HotReloadStatus {
        HotReloadStatus {
            enabled: self.handle.lock().expect("watcher handle lock poisoned").is_some(),
            changes_detected: self.changes_detected.load(Ordering::Relaxed),
            errors_count: self.errors_count.load(Ordering::Relaxed),
            last_enabled: self.last_enabled.lock().expect("timestamp lock poisoned").clone(),
            last_disabled: self.last_disabled.lock().expect("timestamp lock poisoned").clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_starts_idle() {
        let coordinator = IndexCoordinator::new(Path::new("/tmp/nonexistent"));
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[test]
    fn full_run_against_missing_dir_reaches_error_state() {
        let coordinator = IndexCoordinator::new(Path::new("/tmp/oc-coordinator-does-not-exist-xyz"));
        let config = IndexConfig::default();
        let result = coordinator.run_full(&config);
        assert!(result.is_ok() || coordinator.state() == CoordinatorState::Error);
    }

    #[test]
    fn full_run_with_state_store_persists_file_state_and_progress() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.py"), "def foo():\n    pass\n").unwrap();

        let state = Arc::new(ProjectStateStore::open_in_memory().unwrap());
        let project_id = ProjectId::generate(&tmp.path().to_string_lossy());
        let coordinator = IndexCoordinator::new(tmp.path()).with_state_store(project_id, state.clone());

        let config = IndexConfig::default();
        let report = coordinator.run_full(&config).unwrap();
        assert_eq!(report.files_indexed, 1);

        assert_eq!(state.get_status(project_id).unwrap(), Some(ProjectStatus::Ready));
        let progress = state.get_progress(project_id).unwrap().unwrap();
        assert_eq!(progress.indexed_files, 1);
        assert!(state.get_file_state(project_id, "a.py").unwrap().is_some());
    }

    #[test]
    fn detect_changes_without_state_store_is_empty() {
        let coordinator = IndexCoordinator::new(Path::new("/tmp/nonexistent"));
        assert_eq!(coordinator.detect_changes().unwrap(), Vec::new());
    }

    #[test]
    fn detect_changes_reports_new_file_after_sync() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.py"), "x = 1\n").unwrap();

        let state = Arc::new(ProjectStateStore::open_in_memory().unwrap());
        let project_id = ProjectId::generate(&tmp.path().to_string_lossy());
        let coordinator = IndexCoordinator::new(tmp.path()).with_state_store(project_id, state.clone());
        coordinator.run_full(&IndexConfig::default()).unwrap();

        std::fs::write(tmp.path().join("b.py"), "y = 2\n").unwrap();
        let changes = coordinator.detect_changes().unwrap();
        assert_eq!(changes, vec![FileChange::Added { relative_path: "b.py".to_string() }]);
    }

    #[test]
    fn emergency_pressure_shrinks_worker_pool_and_batch_size() {
        use crate::resource_guard::{CleanupRegistry, ErrorThreshold, MemoryGuard};

        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.py"), "def foo():\n    pass\n").unwrap();

        // Any nonzero resident memory trips `Emergency` against a 1-byte limit.
        let guard = Arc::new(ResourceGuard::new(
            MemoryGuard::new(1, 1.0, 1.0, 1.0),
            ErrorThreshold::new(100, std::time::Duration::from_secs(60)),
            CleanupRegistry::new(),
        ));
        let coordinator = IndexCoordinator::new(tmp.path()).with_resource_guard(guard);

        let mut config = IndexConfig::default();
        config.worker_pool_size = 8;
        config.batch_size = 1000;
        let adjusted = coordinator.pressure_adjusted_config(&config);

        if cfg!(target_os = "linux") {
            assert_eq!(adjusted.worker_pool_size, 4);
            assert_eq!(adjusted.batch_size, 500);
        }
    }

    #[test]
    fn full_run_with_performance_monitor_records_duration() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.py"), "def foo():\n    pass\n").unwrap();

        let perf = Arc::new(PerformanceMonitor::new());
        let coordinator = IndexCoordinator::new(tmp.path()).with_performance_monitor(perf.clone());
        coordinator.run_full(&IndexConfig::default()).unwrap();

        let summary = perf.summary("index_full").unwrap();
        assert_eq!(summary.count, 1);
        assert!(summary.avg_ms >= 0.0);
    }

    #[test]
    fn hot_reload_starts_disabled() {
        let tmp = tempfile::TempDir::new().unwrap();
        let controller = HotReloadController::new(tmp.path());
        let status = controller.status();
        assert!(!status.enabled);
        assert_eq!(status.changes_detected, 0);
    }

    #[test]
    fn hot_reload_enable_disable_updates_timestamps() {
        let tmp = tempfile::TempDir::new().unwrap();
        let controller = HotReloadController::new(tmp.path());
        controller.enable().unwrap();
        assert!(controller.status().enabled);
        controller.disable();
        let status = controller.status();
        assert!(!status.enabled);
        assert!(status.last_enabled.is_some());
        assert!(status.last_disabled.is_some());
    }
}
