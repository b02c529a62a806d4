pub mod classify;
pub mod coordinator;
pub mod engine;
pub mod error;

pub use classify::{classify_query, QueryType};
pub use coordinator::SearchCoordinator;
pub use engine::{CallChainNode, ChunkInfo, FunctionContext, RetrievalEngine, SearchQuery, SearchResult};
pub use error::RetrievalError;
