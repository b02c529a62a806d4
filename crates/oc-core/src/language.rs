use serde::{Deserialize, Serialize};

/// Supported programming languages, plus `Text` for content with no
/// confident language match (LanguageDetector's gated fallback, spec §4.5
/// step 4): tagged `language = text` and routed to the Chunker's
/// structure-blind fallback cascade rather than a tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Language {
    Python = 0,
    TypeScript = 1,
    JavaScript = 2,
    Rust = 3,
    Go = 4,
    Java = 5,
    Text = 6,
}

impl Language {
    /// Map a file extension to a Language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" => Some(Self::Python),
            "ts" => Some(Self::TypeScript),
            "tsx" => Some(Self::TypeScript),
            "js" => Some(Self::JavaScript),
            "jsx" => Some(Self::JavaScript),
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            _ => None,
        }
    }

    /// The separator used in qualified names for this language.
    pub fn native_separator(self) -> &'static str {
        match self {
            Self::Rust => "::",
            Self::Go => ".",
            Self::Python | Self::TypeScript | Self::JavaScript | Self::Java | Self::Text => ".",
        }
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Python),
            1 => Some(Self::TypeScript),
            2 => Some(Self::JavaScript),
            3 => Some(Self::Rust),
            4 => Some(Self::Go),
            5 => Some(Self::Java),
            6 => Some(Self::Text),
            _ => None,
        }
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::Text => "text",
        }
    }

    /// Whether this language has a tree-sitter grammar at all -- `Text` is
    /// the generic-fallback tag LanguageDetector emits when nothing else
    /// clears its confidence gate, and never reaches `ParserRegistry`.
    pub fn has_grammar(self) -> bool {
        !matches!(self, Self::Text)
    }
}
