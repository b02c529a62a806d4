use oc_core::Language;
use tree_sitter::Language as TSLanguage;

/// Maps file extensions to tree-sitter grammars and Language enums.
pub struct ParserRegistry;

impl ParserRegistry {
    /// Get the tree-sitter grammar for a given Language and file extension.
    /// The extension is needed because TypeScript/JavaScript have both
    /// regular and TSX grammars.
    pub fn grammar_for_extension(lang: Language, ext: &str) -> TSLanguage {
        match lang {
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::TypeScript => {
                if ext == "tsx" {
                    tree_sitter_typescript::LANGUAGE_TSX.into()
                } else {
                    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
                }
            }
            Language::JavaScript => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            Language::Text => {
                unreachable!("Text has no tree-sitter grammar; callers must check has_grammar() first")
            }
        }
    }

    /// Resolve a file extension to a Language.
    /// Delegates to `Language::from_extension`.
    pub fn language_for_extension(ext: &str) -> Option<Language> {
        Language::from_extension(ext)
    }
}
