use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::{xxh3_128, xxh3_64};

use crate::language::Language;

/// Deterministic chunk identifier, computed as XXH3-128 of
/// `repo_id|relative_path|chunk|byte_start|byte_end|content_hash`.
///
/// The literal `chunk` in the hash input distinguishes chunk IDs from symbol IDs,
/// ensuring no collision even if a chunk and symbol share the same byte range.
/// `content_hash` is folded in so an in-place edit that doesn't shift byte
/// offsets (a same-length token swap inside an unchanged scope) still changes
/// the ID — otherwise the stale embedding for that chunk would never be
/// invalidated on reindex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub u128);

impl ChunkId {
    /// Generate a deterministic chunk ID from its identifying fields plus the
    /// chunk's content hash (see [`CodeChunk::compute_content_hash`]).
    pub fn generate(
        repo_id: &str,
        relative_path: &str,
        byte_start: usize,
        byte_end: usize,
        content_hash: u64,
    ) -> Self {
        let input = format!(
            "{}|{}|chunk|{}|{}|{:016x}",
            repo_id, relative_path, byte_start, byte_end, content_hash
        );
        Self(xxh3_128(input.as_bytes()))
    }

    pub fn as_bytes(&self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({:032x})", self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// The dominant AST scope a chunk was carved from, or how it was produced
/// when no scope-aware split was possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChunkKind {
    Function = 0,
    Class = 1,
    Method = 2,
    Block = 3,
    /// Emitted by the bracket-balance or line-split fallback tiers.
    Fallback = 4,
    /// Anything else the AST-aware chunker windows together.
    Generic = 5,
}

impl ChunkKind {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Function),
            1 => Some(Self::Class),
            2 => Some(Self::Method),
            3 => Some(Self::Block),
            4 => Some(Self::Fallback),
            5 => Some(Self::Generic),
            _ => None,
        }
    }
}

/// An AST-aware code chunk extracted from a source file.
///
/// Chunks split large files into semantically coherent pieces using the
/// cAST algorithm: the tree-sitter AST is traversed and child nodes are
/// greedily grouped into windows that respect a non-whitespace character budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChunk {
    pub id: ChunkId,
    pub language: Language,
    /// Relative to project root, forward-slash normalized.
    pub file_path: PathBuf,
    pub byte_range: Range<usize>,
    /// 0-indexed, end-exclusive.
    pub line_range: Range<u32>,
    /// 0-based index of this chunk within the file.
    pub chunk_index: u32,
    /// Total number of chunks in the file.
    pub total_chunks: u32,
    /// Dot-separated ancestor scope chain (e.g., "MyClass.my_method").
    /// Empty string for top-level chunks.
    pub context_path: String,
    /// Source text of the chunk (capped at 10 KB).
    pub content: String,
    /// XXH3-64 of the chunk content bytes.
    pub content_hash: u64,
    /// Dominant AST scope this chunk was windowed from.
    pub kind: ChunkKind,
    /// Name of the enclosing symbol, if `context_path` resolves to one.
    pub symbol_name: Option<String>,
}

impl CodeChunk {
    /// Compute a content hash for the given bytes.
    pub fn compute_content_hash(content: &[u8]) -> u64 {
        xxh3_64(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_deterministic() {
        let id1 = ChunkId::generate("repo1", "src/main.py", 100, 200, 42);
        let id2 = ChunkId::generate("repo1", "src/main.py", 100, 200, 42);
        assert_eq!(id1, id2);
    }

    #[test]
    fn chunk_id_changes_on_path_change() {
        let id1 = ChunkId::generate("repo1", "src/a.py", 0, 50, 42);
        let id2 = ChunkId::generate("repo1", "src/b.py", 0, 50, 42);
        assert_ne!(id1, id2);
    }

    #[test]
    fn chunk_id_changes_on_span_change() {
        let id1 = ChunkId::generate("repo1", "src/a.py", 0, 50, 42);
        let id2 = ChunkId::generate("repo1", "src/a.py", 0, 51, 42);
        assert_ne!(id1, id2);
    }

    #[test]
    fn chunk_id_changes_on_content_change_alone() {
        // Same repo, path, and byte range -- an in-place edit that doesn't
        // shift offsets must still produce a new ID.
        let id1 = ChunkId::generate("repo1", "src/a.py", 0, 50, 42);
        let id2 = ChunkId::generate("repo1", "src/a.py", 0, 50, 43);
        assert_ne!(id1, id2);
    }

    #[test]
    fn chunk_id_differs_from_symbol_id() {
        use crate::symbol::SymbolId;
        // Same repo, path, and byte range -- but different ID type
        let chunk_id = ChunkId::generate("repo1", "src/main.py", 0, 100, 42);
        let symbol_id = SymbolId::generate("repo1", "src/main.py", "some_name", 0, 100);
        // The u128 values should differ because chunk uses "chunk" in the hash input
        assert_ne!(chunk_id.0, symbol_id.0);
    }

    #[test]
    fn chunk_id_bytes_round_trip() {
        let id = ChunkId::generate("repo1", "src/main.rs", 10, 20, 42);
        let bytes = id.as_bytes();
        let id2 = ChunkId::from_bytes(bytes);
        assert_eq!(id, id2);
    }

    #[test]
    fn chunk_id_display_hex() {
        let id = ChunkId(0xDEAD_BEEF_CAFE_BABE_1234_5678_9ABC_DEF0);
        let hex = format!("{id}");
        assert_eq!(hex, "deadbeefcafebabe123456789abcdef0");
    }

    #[test]
    fn content_hash_deterministic() {
        let h1 = CodeChunk::compute_content_hash(b"def foo(): pass");
        let h2 = CodeChunk::compute_content_hash(b"def foo(): pass");
        assert_eq!(h1, h2);
    }

    #[test]
    fn content_hash_differs() {
        let h1 = CodeChunk::compute_content_hash(b"def foo(): pass");
        let h2 = CodeChunk::compute_content_hash(b"def bar(): pass");
        assert_ne!(h1, h2);
    }

    #[test]
    fn chunk_kind_ordinal_round_trip() {
        for n in 0..=5u8 {
            let kind = ChunkKind::from_ordinal(n).unwrap();
            assert_eq!(kind.ordinal(), n);
        }
        assert!(ChunkKind::from_ordinal(6).is_none());
    }
}
