use std::path::Path;

use oc_core::{ChunkId, ChunkKind, CodeChunk, CodeRelation, CodeSymbol, Language, RelationKind, SymbolId, SymbolKind};
use rusqlite::{params, Connection};
use xxhash_rust::xxh3::xxh3_128;

use crate::error::StorageError;

/// Current schema version. Increment when schema changes.
///
/// Bumped to 2 when the `chunks` table was added alongside the symbol/
/// relation graph.
const SCHEMA_VERSION: u32 = 2;

/// Direction for graph traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    Outgoing,
    Incoming,
    Both,
}

/// A symbol discovered during k-hop traversal.
#[derive(Debug, Clone)]
pub struct TraversalHit {
    pub symbol_id: SymbolId,
    pub depth: u32,
    pub relation_kind: RelationKind,
}

/// File metadata stored in the `files` table.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub path: String,
    pub content_hash: u64,
    pub language: Language,
    pub size_bytes: u64,
    pub symbol_count: u32,
    pub last_indexed: String,
    pub last_modified: String,
}

/// Repository metadata stored in the `repositories` table.
#[derive(Debug, Clone)]
pub struct RepoMetadata {
    pub id: String,
    pub path: String,
    pub name: String,
    pub created_at: String,
}

/// SQLite-backed graph storage for symbols and relations.
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    /// Open or create a graph store at the given SQLite database path.
    ///
    /// If the schema version doesn't match, returns `Err` so the caller
    /// can purge `.openace/` and retry.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        configure_pragmas(&conn)?;

        let stored_version = get_user_version(&conn)?;
        if stored_version != 0 && stored_version != SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                actual: stored_version,
            });
        }

        create_schema(&conn)?;
        set_user_version(&conn, SCHEMA_VERSION)?;

        Ok(Self { conn })
    }

    /// Open an in-memory graph store (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        create_schema(&conn)?;
        set_user_version(&conn, SCHEMA_VERSION)?;
        Ok(Self { conn })
    }

    // -- Symbol CRUD --

    /// Insert symbols in batched transactions.
    /// `batch_size`: 1000 for bulk, 100 for incremental.
    pub fn insert_symbols(
        &mut self,
        symbols: &[CodeSymbol],
        batch_size: usize,
    ) -> Result<(), StorageError> {
        let now = now_rfc3339();
        for chunk in symbols.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO symbols \
                     (id, name, qualified_name, kind, language, file_path, \
                      line_start, line_end, byte_start, byte_end, \
                      signature, doc_comment, body_hash, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                )?;
                for sym in chunk {
                    stmt.execute(params![
                        sym.id.as_bytes().as_slice(),
                        sym.name,
                        sym.qualified_name,
                        sym.kind.ordinal() as i64,
                        sym.language.ordinal() as i64,
                        sym.file_path.to_string_lossy().as_ref(),
                        sym.line_range.start as i64,
                        sym.line_range.end as i64,
                        sym.byte_range.start as i64,
                        sym.byte_range.end as i64,
                        sym.signature.as_deref(),
                        sym.doc_comment.as_deref(),
                        sym.body_hash as i64,
                        &now,
                        &now,
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Update existing symbols in batched transactions (no FK cascade).
    ///
    /// Unlike `insert_symbols` which uses `INSERT OR REPLACE` (triggering
    /// `ON DELETE CASCADE`), this uses `UPDATE` to preserve cross-file
    /// relations pointing to the modified symbols.
    pub fn update_symbols(
        &mut self,
        symbols: &[CodeSymbol],
        batch_size: usize,
    ) -> Result<(), StorageError> {
        let now = now_rfc3339();
        for chunk in symbols.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "UPDATE symbols SET \
                     name = ?2, qualified_name = ?3, kind = ?4, language = ?5, \
                     file_path = ?6, line_start = ?7, line_end = ?8, \
                     byte_start = ?9, byte_end = ?10, \
                     signature = ?11, doc_comment = ?12, body_hash = ?13, updated_at = ?14 \
                     WHERE id = ?1",
                )?;
                for sym in chunk {
                    stmt.execute(params![
                        sym.id.as_bytes().as_slice(),
                        sym.name,
                        sym.qualified_name,
                        sym.kind.ordinal() as i64,
                        sym.language.ordinal() as i64,
                        sym.file_path.to_string_lossy().as_ref(),
                        sym.line_range.start as i64,
                        sym.line_range.end as i64,
                        sym.byte_range.start as i64,
                        sym.byte_range.end as i64,
                        sym.signature.as_deref(),
                        sym.doc_comment.as_deref(),
                        sym.body_hash as i64,
                        &now,
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Query a symbol by its ID.
    pub fn get_symbol(&self, id: SymbolId) -> Result<Option<CodeSymbol>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, body_hash \
             FROM symbols WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.as_bytes().as_slice()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_symbol(row)?)),
            None => Ok(None),
        }
    }

    /// Query all symbols for a given file path.
    pub fn get_symbols_by_file(&self, file_path: &str) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, body_hash \
             FROM symbols WHERE file_path = ?1",
        )?;
        let mut rows = stmt.query(params![file_path])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// Query symbols by name (exact match).
    pub fn get_symbols_by_name(&self, name: &str) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, body_hash \
             FROM symbols WHERE name = ?1",
        )?;
        let mut rows = stmt.query(params![name])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// Query symbols by qualified name (exact match).
    pub fn get_symbols_by_qualified_name(
        &self,
        qualified_name: &str,
    ) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, body_hash \
             FROM symbols WHERE qualified_name = ?1",
        )?;
        let mut rows = stmt.query(params![qualified_name])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// List all symbols with pagination, ordered by ID for deterministic iteration.
    pub fn list_symbols(&self, limit: usize, offset: usize) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, qualified_name, kind, language, file_path, \
             line_start, line_end, byte_start, byte_end, \
             signature, doc_comment, body_hash \
             FROM symbols ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let mut rows = stmt.query(params![limit as i64, offset as i64])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_symbol(row)?);
        }
        Ok(results)
    }

    /// Count total number of symbols in the store.
    pub fn count_symbols(&self) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM symbols",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete a symbol by ID. Relations are cascaded via ON DELETE CASCADE.
    pub fn delete_symbol(&mut self, id: SymbolId) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM symbols WHERE id = ?1",
            params![id.as_bytes().as_slice()],
        )?;
        Ok(affected > 0)
    }

    /// Delete all relations that reference a given file path (in the relation's file_path column).
    pub fn delete_relations_by_file(&mut self, file_path: &str) -> Result<usize, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM relations WHERE file_path = ?1",
            params![file_path],
        )?;
        Ok(affected)
    }

    /// Delete all symbols (and cascading relations) for a file path.
    pub fn delete_symbols_by_file(&mut self, file_path: &str) -> Result<usize, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM symbols WHERE file_path = ?1",
            params![file_path],
        )?;
        Ok(affected)
    }

    // -- Relation CRUD --

    /// Insert relations in batched transactions.
    pub fn insert_relations(
        &mut self,
        relations: &[CodeRelation],
        batch_size: usize,
    ) -> Result<(), StorageError> {
        for chunk in relations.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO relations \
                     (id, source_id, target_id, kind, file_path, line, confidence) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for rel in chunk {
                    let rel_id = compute_relation_id(rel);
                    stmt.execute(params![
                        rel_id.as_slice(),
                        rel.source_id.as_bytes().as_slice(),
                        rel.target_id.as_bytes().as_slice(),
                        rel.kind.ordinal() as i64,
                        rel.file_path.to_string_lossy().as_ref(),
                        rel.line as i64,
                        rel.confidence as f64,
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// K-hop graph traversal with cycle detection.
    ///
    /// Uses iterative BFS in Rust (not recursive CTE) for reliable cycle
    /// detection and per-node fanout limiting.
    pub fn traverse_khop(
        &self,
        start: SymbolId,
        max_depth: u32,
        max_fanout: u32,
        direction: TraversalDirection,
    ) -> Result<Vec<TraversalHit>, StorageError> {
        let max_depth = max_depth.min(5);
        let mut visited = std::collections::HashSet::new();
        visited.insert(start.0);

        let mut frontier: Vec<SymbolId> = vec![start];
        let mut results = Vec::new();

        for depth in 1..=max_depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();

            for sym_id in &frontier {
                let neighbors =
                    self.get_neighbors(*sym_id, direction, max_fanout)?;
                for (neighbor_id, rel_kind) in neighbors {
                    if visited.insert(neighbor_id.0) {
                        results.push(TraversalHit {
                            symbol_id: neighbor_id,
                            depth,
                            relation_kind: rel_kind,
                        });
                        next_frontier.push(neighbor_id);
                    }
                }
            }

            frontier = next_frontier;
        }

        Ok(results)
    }

    fn get_neighbors(
        &self,
        sym_id: SymbolId,
        direction: TraversalDirection,
        max_fanout: u32,
    ) -> Result<Vec<(SymbolId, RelationKind)>, StorageError> {
        let id_bytes = sym_id.as_bytes();
        let mut results = Vec::new();

        if direction == TraversalDirection::Outgoing || direction == TraversalDirection::Both {
            let mut stmt = self.conn.prepare_cached(
                "SELECT target_id, kind FROM relations WHERE source_id = ?1 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![id_bytes.as_slice(), max_fanout as i64])?;
            while let Some(row) = rows.next()? {
                if let Some((sid, rk)) = parse_neighbor_row(row)? {
                    results.push((sid, rk));
                }
            }
        }

        if direction == TraversalDirection::Incoming || direction == TraversalDirection::Both {
            let remaining = max_fanout.saturating_sub(results.len() as u32);
            if remaining > 0 {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT source_id, kind FROM relations WHERE target_id = ?1 LIMIT ?2",
                )?;
                let mut rows = stmt.query(params![id_bytes.as_slice(), remaining as i64])?;
                while let Some(row) = rows.next()? {
                    if let Some((sid, rk)) = parse_neighbor_row(row)? {
                        results.push((sid, rk));
                    }
                }
            }
        }

        Ok(results)
    }

    // -- File metadata --

    pub fn upsert_file(&mut self, meta: &FileMetadata) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO files \
             (path, content_hash, language, size_bytes, symbol_count, last_indexed, last_modified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                meta.path,
                meta.content_hash as i64,
                meta.language.ordinal() as i64,
                meta.size_bytes as i64,
                meta.symbol_count as i64,
                meta.last_indexed,
                meta.last_modified,
            ],
        )?;
        Ok(())
    }

    pub fn get_file(&self, path: &str) -> Result<Option<FileMetadata>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path, content_hash, language, size_bytes, symbol_count, \
             last_indexed, last_modified FROM files WHERE path = ?1",
        )?;
        let mut rows = stmt.query(params![path])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_file_metadata(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_file_by_content_hash(
        &self,
        content_hash: u64,
    ) -> Result<Vec<FileMetadata>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path, content_hash, language, size_bytes, symbol_count, \
             last_indexed, last_modified FROM files WHERE content_hash = ?1",
        )?;
        let mut rows = stmt.query(params![content_hash as i64])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_file_metadata(row)?);
        }
        Ok(results)
    }

    pub fn delete_file(&mut self, path: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        Ok(affected > 0)
    }

    // -- Repository metadata --

    pub fn upsert_repo(&mut self, meta: &RepoMetadata) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO repositories (id, path, name, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![meta.id, meta.path, meta.name, meta.created_at],
        )?;
        Ok(())
    }

    pub fn get_repo(&self, id: &str) -> Result<Option<RepoMetadata>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, path, name, created_at FROM repositories WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(RepoMetadata {
                id: row.get(0)?,
                path: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get(3)?,
            })),
            None => Ok(None),
        }
    }

    /// Wipe every table for a clean full reindex. Repositories metadata is
    /// intentionally left intact — only the per-file/per-symbol data a full
    /// rescan regenerates is cleared.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM relations", [])?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.execute("DELETE FROM symbols", [])?;
        tx.execute("DELETE FROM files", [])?;
        tx.commit()?;
        Ok(())
    }

    // -- Chunks --

    /// Insert chunks in batched transactions, mirroring `insert_symbols`.
    pub fn insert_chunks(&mut self, chunks: &[CodeChunk], batch_size: usize) -> Result<(), StorageError> {
        for batch in chunks.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO chunks \
                     (id, language, file_path, byte_start, byte_end, line_start, line_end, \
                      chunk_index, total_chunks, context_path, content, content_hash, kind, symbol_name) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                )?;
                for chunk in batch {
                    stmt.execute(params![
                        chunk.id.as_bytes().as_slice(),
                        chunk.language.ordinal() as i64,
                        chunk.file_path.to_string_lossy().as_ref(),
                        chunk.byte_range.start as i64,
                        chunk.byte_range.end as i64,
                        chunk.line_range.start as i64,
                        chunk.line_range.end as i64,
                        chunk.chunk_index as i64,
                        chunk.total_chunks as i64,
                        chunk.context_path,
                        chunk.content,
                        chunk.content_hash as i64,
                        chunk.kind.ordinal() as i64,
                        chunk.symbol_name.as_deref(),
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    pub fn get_chunks_by_file(&self, file_path: &str) -> Result<Vec<CodeChunk>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, language, file_path, byte_start, byte_end, line_start, line_end, \
             chunk_index, total_chunks, context_path, content, content_hash, kind, symbol_name \
             FROM chunks WHERE file_path = ?1 ORDER BY chunk_index",
        )?;
        let mut rows = stmt.query(params![file_path])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_chunk(row)?);
        }
        Ok(results)
    }

    pub fn delete_chunks_by_file(&mut self, file_path: &str) -> Result<usize, StorageError> {
        let affected = self
            .conn
            .execute("DELETE FROM chunks WHERE file_path = ?1", params![file_path])?;
        Ok(affected)
    }

    pub fn count_chunks(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Distinct file paths that currently have at least one indexed symbol.
    pub fn list_files(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT path FROM files ORDER BY path")?;
        let mut rows = stmt.query([])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row.get(0)?);
        }
        Ok(results)
    }

    /// K-hop traversal restricted to a subset of relation kinds, used by the
    /// relation-aware graph expansion signals (callees/callers/hierarchy).
    /// `None` for `kinds` behaves exactly like `traverse_khop`.
    pub fn traverse_khop_filtered(
        &self,
        start: SymbolId,
        max_depth: u32,
        max_fanout: u32,
        direction: TraversalDirection,
        kinds: Option<&[RelationKind]>,
    ) -> Result<Vec<TraversalHit>, StorageError> {
        let max_depth = max_depth.min(5);
        let mut visited = std::collections::HashSet::new();
        visited.insert(start.0);

        let mut frontier: Vec<SymbolId> = vec![start];
        let mut results = Vec::new();

        for depth in 1..=max_depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();

            for sym_id in &frontier {
                let neighbors = self.get_neighbors_filtered(*sym_id, direction, max_fanout, kinds)?;
                for (neighbor_id, rel_kind) in neighbors {
                    if visited.insert(neighbor_id.0) {
                        results.push(TraversalHit {
                            symbol_id: neighbor_id,
                            depth,
                            relation_kind: rel_kind,
                        });
                        next_frontier.push(neighbor_id);
                    }
                }
            }

            frontier = next_frontier;
        }

        Ok(results)
    }

    fn get_neighbors_filtered(
        &self,
        sym_id: SymbolId,
        direction: TraversalDirection,
        max_fanout: u32,
        kinds: Option<&[RelationKind]>,
    ) -> Result<Vec<(SymbolId, RelationKind)>, StorageError> {
        let Some(allowed) = kinds else {
            return self.get_neighbors(sym_id, direction, max_fanout);
        };
        if allowed.is_empty() {
            return Ok(Vec::new());
        }

        let id_bytes: Vec<u8> = sym_id.as_bytes().to_vec();
        let placeholders: Vec<String> = (0..allowed.len()).map(|i| format!("?{}", i + 2)).collect();
        let kind_list = placeholders.join(", ");
        let kind_ords: Vec<i64> = allowed.iter().map(|k| k.ordinal() as i64).collect();
        let mut results = Vec::new();

        if direction == TraversalDirection::Outgoing || direction == TraversalDirection::Both {
            let sql = format!(
                "SELECT target_id, kind FROM relations WHERE source_id = ?1 AND kind IN ({kind_list}) LIMIT {max_fanout}"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&id_bytes as &dyn rusqlite::ToSql];
            for ord in &kind_ords {
                params_vec.push(ord as &dyn rusqlite::ToSql);
            }
            let mut rows = stmt.query(params_vec.as_slice())?;
            while let Some(row) = rows.next()? {
                if let Some((sid, rk)) = parse_neighbor_row(row)? {
                    results.push((sid, rk));
                }
            }
        }

        if direction == TraversalDirection::Incoming || direction == TraversalDirection::Both {
            let remaining = max_fanout.saturating_sub(results.len() as u32);
            if remaining > 0 {
                let sql = format!(
                    "SELECT source_id, kind FROM relations WHERE target_id = ?1 AND kind IN ({kind_list}) LIMIT {remaining}"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&id_bytes as &dyn rusqlite::ToSql];
                for ord in &kind_ords {
                    params_vec.push(ord as &dyn rusqlite::ToSql);
                }
                let mut rows = stmt.query(params_vec.as_slice())?;
                while let Some(row) = rows.next()? {
                    if let Some((sid, rk)) = parse_neighbor_row(row)? {
                        results.push((sid, rk));
                    }
                }
            }
        }

        Ok(results)
    }

    /// Expose the raw connection for advanced usage (e.g., testing).
    #[doc(hidden)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn configure_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\
         PRAGMA busy_timeout = 5000;\
         PRAGMA synchronous = NORMAL;\
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

fn get_user_version(conn: &Connection) -> Result<u32, StorageError> {
    let v: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(v)
}

fn set_user_version(conn: &Connection, version: u32) -> Result<(), StorageError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS symbols (
            id          BLOB PRIMARY KEY,
            name        TEXT NOT NULL,
            qualified_name TEXT NOT NULL,
            kind        INTEGER NOT NULL,
            language    INTEGER NOT NULL,
            file_path   TEXT NOT NULL,
            line_start  INTEGER NOT NULL,
            line_end    INTEGER NOT NULL,
            byte_start  INTEGER NOT NULL,
            byte_end    INTEGER NOT NULL,
            signature   TEXT,
            doc_comment TEXT,
            body_hash   INTEGER NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path);
        CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
        CREATE INDEX IF NOT EXISTS idx_symbols_qualified ON symbols(qualified_name);
        CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);

        CREATE TABLE IF NOT EXISTS relations (
            id          BLOB PRIMARY KEY,
            source_id   BLOB NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
            target_id   BLOB NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
            kind        INTEGER NOT NULL,
            file_path   TEXT NOT NULL,
            line        INTEGER NOT NULL,
            confidence  REAL NOT NULL,
            UNIQUE(source_id, target_id, kind)
        );

        CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source_id);
        CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_id);
        CREATE INDEX IF NOT EXISTS idx_relations_kind ON relations(kind);

        CREATE TABLE IF NOT EXISTS files (
            path          TEXT PRIMARY KEY,
            content_hash  INTEGER NOT NULL,
            language      INTEGER NOT NULL,
            size_bytes    INTEGER NOT NULL,
            symbol_count  INTEGER NOT NULL,
            last_indexed  TEXT NOT NULL,
            last_modified TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS repositories (
            id          TEXT PRIMARY KEY,
            path        TEXT NOT NULL,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            id           BLOB PRIMARY KEY,
            language     INTEGER NOT NULL,
            file_path    TEXT NOT NULL,
            byte_start   INTEGER NOT NULL,
            byte_end     INTEGER NOT NULL,
            line_start   INTEGER NOT NULL,
            line_end     INTEGER NOT NULL,
            chunk_index  INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            context_path TEXT NOT NULL,
            content      TEXT NOT NULL,
            content_hash INTEGER NOT NULL,
            kind         INTEGER NOT NULL,
            symbol_name  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path);",
    )?;
    Ok(())
}

/// Simple UTC timestamp formatter shared by every component that needs an
/// RFC3339-ish stamp without pulling in a chrono/time dependency.
pub fn now_rfc3339() -> String {
    // We avoid pulling in chrono/time crates. Use a simple UTC timestamp.
    // Format: 2024-01-15T10:30:00Z
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    // Compute from epoch seconds
    let days = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    // Days to Y-M-D (simplified leap year calculation from epoch 1970-01-01)
    let (year, month, day) = days_to_ymd(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hours, minutes, seconds
    )
}

fn days_to_ymd(mut days: u64) -> (u64, u64, u64) {
    // Civil days from epoch algorithm
    let mut year = 1970u64;
    loop {
        let days_in_year = if is_leap(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        year += 1;
    }
    let leap = is_leap(year);
    let months: [u64; 12] = [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut month = 1u64;
    for &m in &months {
        if days < m {
            break;
        }
        days -= m;
        month += 1;
    }
    (year, month, days + 1)
}

fn is_leap(y: u64) -> bool {
    y % 4 == 0 && (y % 100 != 0 || y % 400 == 0)
}

/// `(source_id, target_id, kind)` is the edge's full identity — `file_path`
/// and `line` ride along as payload, not key, so the same conceptual edge
/// observed at a second call site collapses onto the existing row instead of
/// duplicating it.
fn compute_relation_id(rel: &CodeRelation) -> [u8; 16] {
    let input = format!(
        "{}|{}|{}",
        rel.source_id,
        rel.target_id,
        rel.kind.ordinal(),
    );
    xxh3_128(input.as_bytes()).to_le_bytes()
}

fn parse_neighbor_row(
    row: &rusqlite::Row<'_>,
) -> Result<Option<(SymbolId, RelationKind)>, StorageError> {
    let blob: Vec<u8> = row.get(0)?;
    if blob.len() != 16 {
        return Ok(None);
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&blob);
    let kind_ord: i64 = row.get(1)?;
    match RelationKind::from_ordinal(kind_ord as u8) {
        Some(rk) => Ok(Some((SymbolId::from_bytes(bytes), rk))),
        None => Ok(None),
    }
}

fn row_to_symbol(row: &rusqlite::Row<'_>) -> Result<CodeSymbol, StorageError> {
    let id_blob: Vec<u8> = row.get(0)?;
    if id_blob.len() != 16 {
        return Err(StorageError::TransactionFailed {
            reason: format!("invalid symbol id length: {}", id_blob.len()),
        });
    }
    let mut id_bytes = [0u8; 16];
    id_bytes.copy_from_slice(&id_blob);

    let kind_ord: i64 = row.get(3)?;
    let lang_ord: i64 = row.get(4)?;
    let file_path_str: String = row.get(5)?;
    let line_start: i64 = row.get(6)?;
    let line_end: i64 = row.get(7)?;
    let byte_start: i64 = row.get(8)?;
    let byte_end: i64 = row.get(9)?;
    let body_hash: i64 = row.get(12)?;

    let kind = SymbolKind::from_ordinal(kind_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid symbol kind ordinal: {}", kind_ord),
        }
    })?;
    let language = Language::from_ordinal(lang_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid language ordinal: {}", lang_ord),
        }
    })?;

    Ok(CodeSymbol {
        id: SymbolId::from_bytes(id_bytes),
        name: row.get(1)?,
        qualified_name: row.get(2)?,
        kind,
        language,
        file_path: file_path_str.into(),
        byte_range: (byte_start as usize)..(byte_end as usize),
        line_range: (line_start as u32)..(line_end as u32),
        signature: row.get(10)?,
        doc_comment: row.get(11)?,
        body_hash: body_hash as u64,
        body_text: None,
    })
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> Result<CodeChunk, StorageError> {
    let id_blob: Vec<u8> = row.get(0)?;
    if id_blob.len() != 16 {
        return Err(StorageError::TransactionFailed {
            reason: format!("invalid chunk id length: {}", id_blob.len()),
        });
    }
    let mut id_bytes = [0u8; 16];
    id_bytes.copy_from_slice(&id_blob);

    let lang_ord: i64 = row.get(1)?;
    let file_path_str: String = row.get(2)?;
    let byte_start: i64 = row.get(3)?;
    let byte_end: i64 = row.get(4)?;
    let line_start: i64 = row.get(5)?;
    let line_end: i64 = row.get(6)?;
    let chunk_index: i64 = row.get(7)?;
    let total_chunks: i64 = row.get(8)?;
    let content_hash: i64 = row.get(11)?;
    let kind_ord: i64 = row.get(12)?;

    let language = Language::from_ordinal(lang_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid language ordinal: {}", lang_ord),
        }
    })?;
    let kind = ChunkKind::from_ordinal(kind_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid chunk kind ordinal: {}", kind_ord),
        }
    })?;

    Ok(CodeChunk {
        id: ChunkId::from_bytes(id_bytes),
        language,
        file_path: file_path_str.into(),
        byte_range: (byte_start as usize)..(byte_end as usize),
        line_range: (line_start as u32)..(line_end as u32),
        chunk_index: chunk_index as u32,
        total_chunks: total_chunks as u32,
        context_path: row.get(9)?,
        content: row.get(10)?,
        content_hash: content_hash as u64,
        kind,
        symbol_name: row.get(13)?,
    })
}

fn row_to_file_metadata(row: &rusqlite::Row<'_>) -> Result<FileMetadata, StorageError> {
    let content_hash: i64 = row.get(1)?;
    let lang_ord: i64 = row.get(2)?;
    let size: i64 = row.get(3)?;
    let sym_count: i64 = row.get(4)?;

    let language = Language::from_ordinal(lang_ord as u8).ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: format!("invalid language ordinal: {}", lang_ord),
        }
    })?;

    Ok(FileMetadata {
        path: row.get(0)?,
        content_hash: content_hash as u64,
        language,
        size_bytes: size as u64,
        symbol_count: sym_count as u32,
        last_indexed: row.get(5)?,
        last_modified: row.get(6)?,
    })
}
