use oc_core::{CodeChunk, CodeRelation, CodeSymbol};
use oc_parser::ParseOutput;

/// Symbols, relations, and chunks ready to hand to `GraphStore`/`VectorStore`
/// inserts, with `body_text` populated from the file's own source bytes.
pub struct MappedFile {
    pub symbols: Vec<CodeSymbol>,
    pub relations: Vec<CodeRelation>,
    pub chunks: Vec<CodeChunk>,
}

/// Pure mapping from one file's parse output to storage-ready records.
///
/// The only transformation applied here is filling in each symbol's
/// `body_text` from its byte range in `source_bytes` (tree-sitter only
/// gives us ranges, not text) capped at 10 KB — everything else passes
/// through unchanged. Factored out of the full-index pipeline so
/// incremental updates can reuse the exact same byte-range-to-text slicing
/// instead of re-deriving it.
pub fn map_parsed_file(output: ParseOutput, chunks: Vec<CodeChunk>, source_bytes: &[u8]) -> MappedFile {
    let mut symbols = output.symbols;
    for sym in &mut symbols {
        let start = sym.byte_range.start;
        let end = sym.byte_range.end.min(source_bytes.len());
        if start < end {
            let body = String::from_utf8_lossy(&source_bytes[start..end]);
            sym.body_text = Some(oc_core::truncate_utf8_bytes(&body, 10240).to_string());
        }
    }

    MappedFile {
        symbols,
        relations: output.relations,
        chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_core::{Language, SymbolId, SymbolKind};
    use std::path::PathBuf;

    fn sample_symbol(start: usize, end: usize) -> CodeSymbol {
        CodeSymbol {
            id: SymbolId::generate("repo", "f.py", "foo", start, end),
            name: "foo".to_string(),
            qualified_name: "f.foo".to_string(),
            kind: SymbolKind::Function,
            language: Language::Python,
            file_path: PathBuf::from("f.py"),
            byte_range: start..end,
            line_range: 0..1,
            signature: None,
            doc_comment: None,
            body_hash: 0,
            body_text: None,
        }
    }

    #[test]
    fn fills_body_text_from_byte_range() {
        let source = b"def foo():\n    return 1\n";
        let output = ParseOutput {
            symbols: vec![sample_symbol(0, 10)],
            relations: vec![],
        };

        let mapped = map_parsed_file(output, vec![], source);
        assert_eq!(mapped.symbols[0].body_text.as_deref(), Some("def foo():"));
    }

    #[test]
    fn leaves_body_text_none_for_out_of_range() {
        let source = b"short";
        let output = ParseOutput {
            symbols: vec![sample_symbol(100, 200)],
            relations: vec![],
        };

        let mapped = map_parsed_file(output, vec![], source);
        assert_eq!(mapped.symbols[0].body_text, None);
    }

    #[test]
    fn relations_and_chunks_pass_through() {
        let output = ParseOutput {
            symbols: vec![],
            relations: vec![],
        };
        let mapped = map_parsed_file(output, vec![], b"");
        assert!(mapped.relations.is_empty());
        assert!(mapped.chunks.is_empty());
    }
}
