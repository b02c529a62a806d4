use std::collections::HashMap;
use std::time::Duration;

use oc_parser::ChunkConfig;

/// Configuration for the indexing pipeline.
#[derive(Clone)]
pub struct IndexConfig {
    /// Repository identifier for SymbolId generation.
    pub repo_id: String,
    /// Batch size for SQLite bulk inserts (default: 1000).
    pub batch_size: usize,
    /// Vector dimension for the project's `VectorStore`.
    pub embedding_dim: usize,
    /// Whether to run the chunker alongside symbol/relation extraction.
    pub chunk_enabled: bool,
    /// Chunker tuning (window size, overlap), used only when `chunk_enabled`.
    pub chunk_config: ChunkConfig,
    /// Files larger than this are skipped (bytes).
    pub max_file_size: u64,
    /// Size of the bounded worker pool (`P`) the parallel parse stage runs
    /// on. `IndexCoordinator` shrinks this under `Emergency` memory
    /// pressure before handing the config to the pipeline.
    pub worker_pool_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            repo_id: String::new(),
            batch_size: 1000,
            embedding_dim: 384,
            chunk_enabled: true,
            chunk_config: ChunkConfig::default(),
            max_file_size: 1_048_576,
            worker_pool_size: rayon::current_num_threads(),
        }
    }
}

/// Reason why a file was skipped during indexing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SkipReason {
    TooLarge,
    Binary,
    UnsupportedLanguage,
    Ignored,
}

/// Report generated after a full indexing run.
#[derive(Debug)]
pub struct IndexReport {
    pub total_files_scanned: usize,
    pub files_indexed: usize,
    pub files_skipped: HashMap<SkipReason, usize>,
    pub files_failed: usize,
    pub failed_details: Vec<(String, String)>,
    pub total_symbols: usize,
    pub total_relations: usize,
    pub total_chunks: usize,
    pub duration: Duration,
}

impl IndexReport {
    pub fn total_skipped(&self) -> usize {
        self.files_skipped.values().sum()
    }
}
