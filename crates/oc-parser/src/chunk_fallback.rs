use std::path::PathBuf;

use oc_core::{ChunkId, ChunkKind, CodeChunk, Language};
use xxhash_rust::xxh3::xxh3_64;

use crate::chunker::ChunkConfig;

const CHUNK_CONTENT_MAX_BYTES: usize = 10_240;

/// Split `source` into balanced-bracket spans, used when a file has no
/// usable tree-sitter grammar (or parsing failed) but still benefits from
/// grouping rather than a flat line split. Brackets are tracked across the
/// three common pairs; a span closes once the running depth returns to 0
/// and the accumulated non-whitespace size reaches the budget.
fn bracket_balance_spans(source: &str, max_chars: usize) -> Vec<(usize, usize)> {
    let bytes = source.as_bytes();
    let mut spans = Vec::new();
    let mut depth: i64 = 0;
    let mut span_start = 0usize;
    let mut nws_count = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth -= 1,
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            nws_count += 1;
        }
        let at_end = i + 1 == bytes.len();
        if (depth <= 0 && nws_count >= max_chars) || at_end {
            let end = i + 1;
            if end > span_start {
                spans.push((span_start, end));
            }
            span_start = end;
            nws_count = 0;
        }
    }
    spans
}

/// Split `source` into line-based windows of roughly `max_lines` lines each,
/// carrying `overlap_lines` trailing lines into the next window. This is the
/// last-resort tier: it understands nothing about structure, only line
/// boundaries, and is only reached when bracket balancing also fails to
/// make progress (e.g. a single unbroken line, or a non-bracketed language).
fn line_split_spans(source: &str, max_lines: usize, overlap_lines: usize) -> Vec<(usize, usize)> {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(source.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    if line_starts.len() <= 1 {
        return vec![(0, source.len())];
    }

    let mut spans = Vec::new();
    let mut start_line = 0usize;
    while start_line < line_starts.len() {
        let end_line = (start_line + max_lines).min(line_starts.len() - 1);
        let byte_start = line_starts[start_line];
        let byte_end = if end_line < line_starts.len() - 1 {
            line_starts[end_line]
        } else {
            source.len()
        };
        if byte_end > byte_start {
            spans.push((byte_start, byte_end));
        }
        if end_line >= line_starts.len() - 1 {
            break;
        }
        start_line = end_line.saturating_sub(overlap_lines).max(start_line + 1);
    }
    spans
}

/// Build `CodeChunk`s without a tree-sitter AST, tagging every emitted
/// chunk `ChunkKind::Fallback`. Tries bracket balancing first (useful for
/// brace-delimited languages tree-sitter doesn't have a grammar for here);
/// falls back to a flat line split if that makes no progress (produces
/// either zero spans or a single span covering the whole file when the
/// file is larger than one window).
pub fn chunk_file_fallback(
    repo_id: &str,
    file_path: &str,
    source: &str,
    language: Language,
    config: &ChunkConfig,
) -> Vec<CodeChunk> {
    if source.is_empty() {
        return Vec::new();
    }

    let mut spans = bracket_balance_spans(source, config.max_chunk_chars);
    let bracket_progress = spans.len() > 1 || source.len() <= config.max_chunk_chars * 4;
    if !bracket_progress {
        // Bracket balancing didn't actually split a large file down (e.g.
        // everything sits inside one unclosed/unbalanced span) — degrade to
        // a plain line split instead of emitting one giant chunk.
        spans = line_split_spans(source, 60, config.overlap_nodes.max(1) * 5);
    }

    let total_chunks = spans.len() as u32;
    spans
        .into_iter()
        .enumerate()
        .map(|(chunk_index, (byte_start, byte_end))| {
            let chunk_source = &source[byte_start..byte_end];
            let content = oc_core::truncate_utf8_bytes(chunk_source, CHUNK_CONTENT_MAX_BYTES);
            let content_hash = xxh3_64(content.as_bytes());
            let line_start = source[..byte_start].matches('\n').count() as u32;
            let line_end = line_start + chunk_source.matches('\n').count() as u32 + 1;
            let id = ChunkId::generate(repo_id, file_path, byte_start, byte_end, content_hash);
            CodeChunk {
                id,
                language,
                file_path: PathBuf::from(file_path),
                byte_range: byte_start..byte_end,
                line_range: line_start..line_end,
                chunk_index: chunk_index as u32,
                total_chunks,
                context_path: String::new(),
                content: content.to_string(),
                content_hash,
                kind: ChunkKind::Fallback,
                symbol_name: None,
            }
        })
        .collect()
}
