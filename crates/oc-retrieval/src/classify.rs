/// Deterministic classification of a query's shape, used to steer which
/// signals a [`crate::engine::SearchQuery`] should lean on before the full
/// multi-signal search runs.
///
/// This is advisory, not a signal filter: [`crate::coordinator::
/// SearchCoordinator`] uses it to tune pool sizes and RRF weights, but every
/// enabled signal still runs regardless of the verdict — a misclassified
/// query degrades gracefully (smaller pool for a signal that turns out to
/// matter) instead of losing a signal outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Looks like a literal filename, with or without a directory prefix
    /// (`engine.rs`, `src/handler.go`) — no whitespace, ends in a
    /// recognizable extension.
    ExactFilename,
    /// Contains a path separator but isn't a single bare filename (a
    /// directory-scoped query like `src/python/`), or a glob wildcard.
    PathPattern,
    /// A bare extension search (`*.rs`, `.py`) — language/extension is the
    /// entire query.
    ExtensionSearch,
    /// Names a structural relationship explicitly ("callers of X", "who
    /// implements Y", "subclasses of Z").
    GraphRelation,
    /// Free-form English prose describing behavior rather than naming an
    /// entity.
    SemanticDescription,
    /// Doesn't cleanly fit one of the above — short identifier-like query,
    /// or a mix of identifier and prose tokens. Every signal gets a fair
    /// pool rather than betting on one.
    Hybrid,
}

const GRAPH_RELATION_KEYWORDS: &[&str] = &[
    "callers of",
    "called by",
    "callees of",
    "calls",
    "who calls",
    "implements",
    "implemented by",
    "extends",
    "inherits",
    "inherited by",
    "subclasses of",
    "subclass of",
    "overrides",
    "references",
    "referenced by",
];

/// Classify `text` into one of the six query-shape buckets via a small,
/// deterministic rule set over keywords, quotes, wildcards, and path
/// separators — no scoring, no ML, same verdict every time for the same
/// input.
pub fn classify_query(text: &str) -> QueryType {
    let trimmed = text.trim().trim_matches('"').trim();
    let lower = trimmed.to_lowercase();

    if trimmed.is_empty() {
        return QueryType::SemanticDescription;
    }

    if is_extension_search(trimmed) {
        return QueryType::ExtensionSearch;
    }

    if GRAPH_RELATION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return QueryType::GraphRelation;
    }

    let has_path_sep = trimmed.contains('/') || trimmed.contains('\\');
    let has_wildcard = trimmed.contains('*') || trimmed.contains('?');
    let has_whitespace = trimmed.split_whitespace().count() > 1;

    if !has_whitespace && has_extension(trimmed) && !has_wildcard {
        return QueryType::ExactFilename;
    }

    if !has_whitespace && (has_path_sep || has_wildcard) {
        return QueryType::PathPattern;
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens.len() <= 1 {
        return QueryType::Hybrid;
    }

    let identifier_tokens = tokens.iter().filter(|t| looks_like_identifier(t)).count();
    let ratio = identifier_tokens as f64 / tokens.len() as f64;
    if ratio <= 0.2 {
        QueryType::SemanticDescription
    } else {
        QueryType::Hybrid
    }
}

/// `*.ext` or a bare `.ext` with nothing else — the whole query names an
/// extension rather than a specific file.
fn is_extension_search(text: &str) -> bool {
    if text.split_whitespace().count() > 1 {
        return false;
    }
    let stripped = text.strip_prefix('*').unwrap_or(text);
    stripped.starts_with('.')
        && stripped.len() > 1
        && stripped[1..].chars().all(|c| c.is_alphanumeric())
}

fn has_extension(text: &str) -> bool {
    match text.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_alphanumeric())
        }
        None => false,
    }
}

/// A plain English word is also "alphanumeric only", so that alone can't
/// distinguish prose from an identifier — `looks_like_identifier` requires
/// a structural marker an identifier has and a dictionary word doesn't:
/// underscores, dots, colons, digits, or an internal lower-to-upper case
/// transition (camelCase/PascalCase). A capitalized sentence-starting word
/// ("Where") has no such transition and is correctly treated as prose.
fn looks_like_identifier(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    if !token
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
    {
        return false;
    }
    if token.contains(['_', '.', ':']) || token.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    token
        .chars()
        .collect::<Vec<_>>()
        .windows(2)
        .any(|w| w[0].is_lowercase() && w[1].is_uppercase())
}
