use crate::language::Language;

/// Utilities for qualified name normalization and rendering.
pub struct QualifiedName;

impl QualifiedName {
    /// Normalize a language-native qualified name to dot-separated canonical form.
    ///
    /// - Rust: `std::collections::HashMap` → `std.collections.HashMap`
    /// - Go: `net/http.Client.Do` → `net.http.Client.Do`
    /// - Python/TS/JS/Java: identity (already dot-separated)
    pub fn normalize(name: &str, language: Language) -> String {
        match language {
            Language::Rust => name.replace("::", "."),
            Language::Go => name.replace('/', "."),
            Language::Python
            | Language::TypeScript
            | Language::JavaScript
            | Language::Java
            | Language::Text => name.to_string(),
        }
    }

    /// Render a canonical dot-separated qualified name in language-native form.
    pub fn to_native(canonical: &str, language: Language) -> String {
        match language {
            Language::Rust => canonical.replace('.', "::"),
            // Go uses `/` for package paths but `.` for member access.
            // Without package boundary info, we keep dots (safe display form).
            Language::Go => canonical.to_string(),
            Language::Python
            | Language::TypeScript
            | Language::JavaScript
            | Language::Java
            | Language::Text => canonical.to_string(),
        }
    }

    /// Join scope segments into a canonical dot-separated qualified name.
    pub fn join(segments: &[&str]) -> String {
        segments.join(".")
    }
}
