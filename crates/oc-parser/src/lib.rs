pub mod chunker;
pub mod error;
mod body_hash;
mod chunk_fallback;
mod file_check;
mod language_detect;
mod registry;
mod visitor;

pub use chunk_fallback::chunk_file_fallback;
pub use chunker::{chunk_file, ChunkConfig};
pub use file_check::{check_file_size, is_binary};
pub use language_detect::{
    detect_language, detect_language_default, Detection, DEFAULT_CONFIDENCE_THRESHOLD,
    DEGRADED_CONFIDENCE_THRESHOLD,
};
pub use registry::ParserRegistry;
pub use visitor::{
    parse_file, parse_file_with_tree, parse_file_with_tree_as, ParseOutput, ParseOutputWithTree,
};
