/// Indexer errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("parser error: {0}")]
    Parser(#[from] oc_parser::error::ParserError),

    #[error("storage error: {0}")]
    Storage(#[from] oc_storage::error::StorageError),

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("pipeline failed at stage '{stage}': {reason}")]
    PipelineFailed { stage: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("project state store error: {0}")]
    StateStore(#[from] rusqlite::Error),

    /// A file was only partially written across the vector/graph stores
    /// (e.g. the process died between a graph commit and the matching
    /// vector upsert). Surfaced so the caller can re-run that file rather
    /// than silently trusting an inconsistent index.
    #[error("consistency violation for '{file}': vector_ok={vector_ok}, graph_ok={graph_ok}")]
    ConsistencyViolation {
        file: String,
        vector_ok: bool,
        graph_ok: bool,
    },

    /// A resource guard tripped (memory pressure, error-rate threshold) and
    /// the caller should back off or fall back to a degraded mode rather
    /// than retry immediately.
    #[error("resource pressure: {0}")]
    ResourcePressure(String),
}

impl IndexerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::ResourcePressure(_) => true,
            _ => false,
        }
    }
}
