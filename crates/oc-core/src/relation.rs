use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::symbol::SymbolId;

/// Kinds of relationships between code symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RelationKind {
    Calls = 0,
    Imports = 1,
    Extends = 2,
    Implements = 3,
    Uses = 4,
    Contains = 5,
    Exports = 6,
    References = 7,
    Declares = 8,
    Overrides = 9,
    Modifies = 10,
}

impl RelationKind {
    /// Fixed confidence score for tree-sitter extracted relations.
    pub fn default_confidence(self) -> f32 {
        match self {
            Self::Calls => 0.8,
            Self::Imports => 0.9,
            Self::Extends => 0.85,
            Self::Implements => 0.85,
            Self::Uses => 0.7,
            Self::Contains => 0.95,
            Self::Exports => 0.9,
            Self::References => 0.65,
            Self::Declares => 0.9,
            Self::Overrides => 0.85,
            Self::Modifies => 0.7,
        }
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Calls),
            1 => Some(Self::Imports),
            2 => Some(Self::Extends),
            3 => Some(Self::Implements),
            4 => Some(Self::Uses),
            5 => Some(Self::Contains),
            6 => Some(Self::Exports),
            7 => Some(Self::References),
            8 => Some(Self::Declares),
            9 => Some(Self::Overrides),
            10 => Some(Self::Modifies),
            _ => None,
        }
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

/// A relationship between two code symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRelation {
    pub source_id: SymbolId,
    pub target_id: SymbolId,
    pub kind: RelationKind,
    /// File where the relation was observed.
    pub file_path: PathBuf,
    /// 0-indexed line number.
    pub line: u32,
    pub confidence: f32,
}
