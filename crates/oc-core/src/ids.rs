use xxhash_rust::xxh3::{xxh3_128, xxh3_64};

/// Deterministic ID for a project, derived from its canonicalized root path.
///
/// Mirrors `ChunkId`/`SymbolId`: xxh3-128 over a pipe-joined, type-tagged
/// input string so that a `ProjectId` can never collide with a `FileId` or
/// any other ID kind even if the underlying path strings happen to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(pub u128);

impl ProjectId {
    pub fn generate(canonical_root: &str) -> Self {
        Self(xxh3_128(format!("project|{canonical_root}").as_bytes()))
    }

    pub fn as_bytes(&self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    /// First 16 hex chars, used as the filesystem-safe directory name for a
    /// project's data directory (the `collectionName`/`spaceName` segment).
    pub fn short(&self) -> String {
        format!("{:032x}", self.0)[..16].to_string()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Deterministic ID for a file within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u128);

impl FileId {
    pub fn generate(project_id: ProjectId, relative_path: &str) -> Self {
        Self(xxh3_128(
            format!("file|{project_id}|{relative_path}").as_bytes(),
        ))
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Deterministic ID for a graph edge/relationship, keyed by its endpoints
/// and type so that `(source, target, kind)` maps to a single stable row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipId(pub u128);

impl RelationshipId {
    /// `(source, target, kind)` is the full identity of an edge — the call
    /// site a relation was first observed at is payload, not identity, so
    /// the same conceptual edge seen from two lines (or two re-exporting
    /// files) maps to one row.
    pub fn generate(source_id: u128, target_id: u128, kind_ordinal: u8) -> Self {
        Self(xxh3_128(
            format!("rel|{source_id:032x}|{target_id:032x}|{kind_ordinal}").as_bytes(),
        ))
    }
}

impl std::fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Deterministic ID for a raw AST node reference (used when no symbol or
/// chunk identity applies yet, e.g. while a visitor is still walking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AstNodeId(pub u128);

impl AstNodeId {
    pub fn generate(row: usize, column: usize, kind: &str) -> Self {
        Self(xxh3_128(format!("ast|{kind}|{row}|{column}").as_bytes()))
    }
}

impl std::fmt::Display for AstNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Non-deterministic fallback ID, used only when no stable structural key
/// is available. Carries a literal `fallback:` marker so callers can detect
/// (and, if desired, refuse to persist) a non-reproducible ID; the
/// `sequence` value must come from a caller-owned monotonic counter, never
/// from a wall clock read inline, so construction itself stays pure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FallbackId(pub String);

impl FallbackId {
    pub fn generate(kind: &str, name: &str, sequence: u64) -> Self {
        Self(format!("fallback:{kind}:{name}:{sequence}"))
    }

    pub fn is_fallback(id: &str) -> bool {
        id.contains("fallback:")
    }
}

/// Content-hash helper shared by every ID kind above: xxh3-64 over raw bytes.
pub fn content_hash64(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}
