use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use oc_core::{PerformanceMonitor, ProjectId};
use oc_storage::manager::StorageManager;

use crate::change_detector::FileChange;
use crate::coordinator::IndexCoordinator;
use crate::error::IndexerError;
use crate::pipeline::IncrementalIndexResult;
use crate::project_state::{ProjectStateStore, ProjectStatus};
use crate::report::{IndexConfig, IndexReport};
use crate::resource_guard::ResourceGuard;
use crate::watcher::WatcherHandle;

/// One registered project: its own `StorageManager` (graph/vector/full-text,
/// rooted at `<project_root>/.openace/`) plus an optional live file watcher.
pub struct ProjectHandle {
    pub id: ProjectId,
    pub root: PathBuf,
    storage: RwLock<Option<StorageManager>>,
    watcher: RwLock<Option<WatcherHandle>>,
    state: Arc<ProjectStateStore>,
    resource_guard: Option<Arc<ResourceGuard>>,
    perf: Option<Arc<PerformanceMonitor>>,
}

impl ProjectHandle {
    fn open(
        id: ProjectId,
        root: PathBuf,
        state: Arc<ProjectStateStore>,
        resource_guard: Option<Arc<ResourceGuard>>,
        perf: Option<Arc<PerformanceMonitor>>,
    ) -> Result<Self, IndexerError> {
        let storage = StorageManager::open(&root)?;
        Ok(Self {
            id,
            root,
            storage: RwLock::new(Some(storage)),
            watcher: RwLock::new(None),
            state,
            resource_guard,
            perf,
        })
    }

    fn coordinator(&self) -> IndexCoordinator {
        let mut coordinator = IndexCoordinator::new(&self.root).with_state_store(self.id, self.state.clone());
        if let Some(guard) = &self.resource_guard {
            coordinator = coordinator.with_resource_guard(guard.clone());
        }
        if let Some(perf) = &self.perf {
            coordinator = coordinator.with_performance_monitor(perf.clone());
        }
        coordinator
    }

    /// Run a full index and durably record per-file state and progress in
    /// the registry's `ProjectStateStore`.
    ///
    /// Closes this handle's own `StorageManager` first: `IndexCoordinator`
    /// opens its own against the same `.openace/` directory, and two open
    /// writers racing for the same SQLite/Tantivy locks in one process would
    /// deadlock or fail. Reopens once the run finishes, success or not.
    pub fn index_full(&self, config: &IndexConfig) -> Result<IndexReport, IndexerError> {
        self.close_storage();
        let result = self.coordinator().run_full(config);
        self.reopen_storage(config.embedding_dim)?;
        result
    }

    /// Run an incremental index and durably record per-file state and
    /// progress in the registry's `ProjectStateStore`. See [`Self::index_full`]
    /// for why storage is closed and reopened around the run.
    pub fn index_incremental(&self, config: &IndexConfig) -> Result<IncrementalIndexResult, IndexerError> {
        self.close_storage();
        let result = self.coordinator().run_incremental(config);
        self.reopen_storage(config.embedding_dim)?;
        result
    }

    /// Files changed since the last recorded state, without running a full
    /// indexing pass. Useful for deciding whether `index_incremental` is
    /// worth triggering.
    pub fn pending_changes(&self) -> Result<Vec<FileChange>, IndexerError> {
        self.coordinator().detect_changes()
    }

    fn close_storage(&self) {
        self.storage.write().expect("storage lock poisoned").take();
    }

    fn reopen_storage(&self, embedding_dim: usize) -> Result<(), IndexerError> {
        let reopened = StorageManager::open_with_dimension(&self.root, embedding_dim)?;
        *self.storage.write().expect("storage lock poisoned") = Some(reopened);
        Ok(())
    }

    /// The handle's own `StorageManager`. `None` only while
    /// `index_full`/`index_incremental` has handed control to
    /// `IndexCoordinator` and hasn't reopened it yet.
    pub fn storage(&self) -> std::sync::RwLockReadGuard<'_, Option<StorageManager>> {
        self.storage.read().expect("storage lock poisoned")
    }

    /// See [`Self::storage`].
    pub fn storage_mut(&self) -> std::sync::RwLockWriteGuard<'_, Option<StorageManager>> {
        self.storage.write().expect("storage lock poisoned")
    }

    pub fn set_watcher(&self, handle: Option<WatcherHandle>) {
        *self.watcher.write().expect("watcher lock poisoned") = handle;
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.read().expect("watcher lock poisoned").is_some()
    }

    pub fn stop_watching(&self) {
        if let Some(handle) = self.watcher.write().expect("watcher lock poisoned").take() {
            handle.stop();
        }
    }
}

/// Registry of all projects this process is currently serving, keyed by
/// deterministic [`ProjectId`]. Mirrors `StorageManager`'s single-project
/// facade, generalized to host many projects behind one process the way the
/// retrieval/indexing service described here is meant to run.
pub struct ProjectRegistry {
    data_dir: PathBuf,
    state: Arc<ProjectStateStore>,
    projects: RwLock<HashMap<ProjectId, Arc<ProjectHandle>>>,
    /// Process-wide: memory pressure and error-rate tripwires don't have a
    /// natural per-project scope, so one `ResourceGuard` is shared by every
    /// registered project's `IndexCoordinator`.
    resource_guard: Option<Arc<ResourceGuard>>,
    perf: Option<Arc<PerformanceMonitor>>,
}

impl ProjectRegistry {
    pub fn open(data_dir: &Path) -> Result<Self, IndexerError> {
        let state = ProjectStateStore::open(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            state: Arc::new(state),
            projects: RwLock::new(HashMap::new()),
            resource_guard: None,
            perf: None,
        })
    }

    /// Share one process-wide [`ResourceGuard`] across every project this
    /// registry serves. Affects only handles registered after this call.
    pub fn with_resource_guard(mut self, resource_guard: Arc<ResourceGuard>) -> Self {
        self.resource_guard = Some(resource_guard);
        self
    }

    /// Share one process-wide [`PerformanceMonitor`] across every project
    /// this registry serves. Affects only handles registered after this call.
    pub fn with_performance_monitor(mut self, perf: Arc<PerformanceMonitor>) -> Self {
        self.perf = Some(perf);
        self
    }

    pub fn state_store(&self) -> &ProjectStateStore {
        &self.state
    }

    /// Register a project rooted at `project_root`, opening its storage if
    /// not already registered. Idempotent: re-registering an already-open
    /// project just returns the existing handle.
    pub fn register(&self, project_root: &Path) -> Result<Arc<ProjectHandle>, IndexerError> {
        let canonical = project_root
            .canonicalize()
            .unwrap_or_else(|_| project_root.to_path_buf());
        let id = ProjectId::generate(&canonical.to_string_lossy());

        if let Some(existing) = self.projects.read().expect("registry lock poisoned").get(&id) {
            return Ok(existing.clone());
        }

        self.state.register_project(id, &canonical.to_string_lossy())?;
        let handle = Arc::new(ProjectHandle::open(
            id,
            canonical,
            self.state.clone(),
            self.resource_guard.clone(),
            self.perf.clone(),
        )?);

        self.projects
            .write()
            .expect("registry lock poisoned")
            .insert(id, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, id: ProjectId) -> Option<Arc<ProjectHandle>> {
        self.projects.read().expect("registry lock poisoned").get(&id).cloned()
    }

    /// Unregister and drop a project's in-memory handle. Does not delete
    /// its `.openace/` directory or state-store rows — call
    /// [`ProjectStateStore`] directly for that.
    pub fn unregister(&self, id: ProjectId) {
        if let Some(handle) = self.projects.write().expect("registry lock poisoned").remove(&id) {
            handle.stop_watching();
        }
    }

    pub fn status(&self, id: ProjectId) -> Result<Option<ProjectStatus>, IndexerError> {
        self.state.get_status(id)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn project_ids(&self) -> Vec<ProjectId> {
        self.projects.read().expect("registry lock poisoned").keys().copied().collect()
    }
}
