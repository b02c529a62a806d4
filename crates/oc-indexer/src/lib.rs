pub mod change_detector;
pub mod coordinator;
pub mod embedding;
pub mod error;
pub mod graph_mapper;
pub mod ignore_rules;
pub mod incremental;
pub mod pipeline;
pub mod project;
pub mod project_state;
pub mod report;
pub mod resolver;
pub mod resource_guard;
pub mod scanner;
pub mod walker;
pub mod watcher;

pub use change_detector::{ChangeDetector, FileChange};
pub use coordinator::{CoordinatorState, HotReloadController, HotReloadStatus, IndexCoordinator};
pub use embedding::{EmbeddingGateway, EmbeddingProvider};
pub use graph_mapper::{map_parsed_file, MappedFile};
pub use ignore_rules::IgnoreRuleSet;
pub use incremental::{
    delete_file as incremental_delete, diff_symbols, process_events, update_file,
    IncrementalReport, SymbolDiff,
};
pub use oc_parser::{ChunkConfig, chunk_file};
pub use pipeline::{index, index_incremental, IncrementalIndexResult};
pub use project::{ProjectHandle, ProjectRegistry};
pub use project_state::{FileIndexState, ProjectStateStore, ProjectStatus};
pub use report::{IndexConfig, IndexReport, SkipReason};
pub use resolver::ResolutionStats;
pub use resource_guard::{
    CleanupRegistry, CleanupStrategy, ErrorThreshold, MemoryGuard, MemoryPressureTier, ResourceGuard,
};
pub use scanner::scan_files;
pub use walker::{FileWalker, WalkEntry};
pub use watcher::{start_watching, ChangeEvent, WatcherHandle};
