use oc_core::Language;

/// Confidence below which a detection signal is not trusted enough to
/// override a lower-priority one, and below which the gated fallback
/// rejects the whole cascade (routes the file to the generic/text splitter).
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Relaxed threshold used while `ErrorThreshold::should_use_fallback` is
/// tripped: accept weaker syntax-pattern guesses rather than falling all
/// the way back to generic-text chunking for every unresolved file.
pub const DEGRADED_CONFIDENCE_THRESHOLD: f32 = 0.4;

/// A detection outcome paired with how sure the cascade is about it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub language: Language,
    pub confidence: f32,
}

/// Strip exactly one recognized backup/temp suffix layer, returning the
/// synthetic name underneath plus the confidence ceiling tier 2 caps the
/// final detection at. Values are drawn from the `{0.95, 0.9, 0.8, 0.7, 0.6,
/// 0.5}` bucket, ranked by how likely the backup still matches the live
/// file's content: a `.orig` (pre-merge snapshot) is trusted more than a
/// `.swp`/`.tmp` scratch file, and an Emacs `#file#` autosave least of all.
fn backup_suffix_confidence(name: &str) -> Option<(&str, f32)> {
    if let Some(stripped) = name.strip_suffix(".orig") {
        return Some((stripped, 0.95));
    }
    if let Some(stripped) = name.strip_suffix('~') {
        return Some((stripped, 0.9));
    }
    if let Some(stripped) = name.strip_suffix(".bak") {
        return Some((stripped, 0.8));
    }
    if let Some(stripped) = name.strip_suffix(".swp") {
        return Some((stripped, 0.7));
    }
    if let Some(stripped) = name.strip_suffix(".tmp") {
        return Some((stripped, 0.6));
    }
    if let Some(inner) = name.strip_prefix('#').and_then(|s| s.strip_suffix('#')) {
        // Emacs autosave: `#file.py#`.
        return Some((inner, 0.5));
    }
    None
}

fn extension_of(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Tier 1: extension map on the name as given, confidence 1.0. Backup/temp
/// suffixes are deliberately NOT stripped here — that's tier 2's job, and it
/// caps confidence below 1.0 rather than letting a stale backup file claim
/// full certainty.
fn detect_by_extension(file_name: &str) -> Option<Detection> {
    let ext = extension_of(file_name)?;
    Language::from_extension(ext).map(|language| Detection {
        language,
        confidence: 1.0,
    })
}

/// Tier 2: backup/temp files (`x.py.bak`, `.x.swp`, `#x#`, `x~`). Strips one
/// suffix layer, re-runs the full cascade on the synthetic name, and caps
/// the result at `backup_suffix_confidence`'s ceiling — a `.bak` file whose
/// stripped name resolves at 1.0 still only reports 0.8, since the backup
/// copy may be stale relative to what's on disk today.
fn detect_backup(file_name: &str, content: &str) -> Option<Detection> {
    let (synthetic_name, ceiling) = backup_suffix_confidence(file_name)?;
    let inner = detect_language(synthetic_name, content, 0.0)?;
    Some(Detection {
        language: inner.language,
        confidence: inner.confidence.min(ceiling),
    })
}

/// Inspect a `#!` shebang line for an interpreter hint.
fn detect_by_shebang(content: &str) -> Option<Detection> {
    let first_line = content.lines().next()?;
    if !first_line.starts_with("#!") {
        return None;
    }
    let lower = first_line.to_ascii_lowercase();
    let language = if lower.contains("python") {
        Language::Python
    } else if lower.contains("node") {
        Language::JavaScript
    } else {
        return None;
    };
    Some(Detection {
        language,
        confidence: 0.9,
    })
}

/// Cheap syntax fingerprints, used when there is no usable extension or
/// shebang (e.g. a piped-in buffer, or a renamed source file).
fn detect_by_syntax_patterns(content: &str) -> Option<Detection> {
    let sample: &str = &content[..content.len().min(4096)];
    let rust_score = ["fn ", "let mut ", "impl ", "::new()", "pub struct"]
        .iter()
        .filter(|p| sample.contains(**p))
        .count();
    let python_score = ["def ", "import ", "self.", "    return", "elif "]
        .iter()
        .filter(|p| sample.contains(**p))
        .count();
    let go_score = ["func ", "package ", ":= ", "go func"]
        .iter()
        .filter(|p| sample.contains(**p))
        .count();
    let java_score = ["public class", "private ", "void ", "System.out"]
        .iter()
        .filter(|p| sample.contains(**p))
        .count();
    let ts_score = ["interface ", "export ", "const ", "=> {"]
        .iter()
        .filter(|p| sample.contains(**p))
        .count();

    let scores = [
        (Language::Rust, rust_score),
        (Language::Python, python_score),
        (Language::Go, go_score),
        (Language::Java, java_score),
        (Language::TypeScript, ts_score),
    ];

    let (language, score) = scores.into_iter().max_by_key(|(_, score)| *score)?;
    if score == 0 {
        return None;
    }
    // Confidence scales with the number of matched patterns out of 5,
    // capped below 1.0 since syntax fingerprints alone are never certain.
    let confidence = (score as f32 / 5.0).min(0.85);
    Some(Detection {
        language,
        confidence,
    })
}

/// Structural signals (brace/indent style), the last resort when syntax
/// keywords didn't produce a confident match. Both signals report the same
/// flat 0.7 — structure alone is exactly at the default gate, never above
/// it, since it carries no language-specific vocabulary.
fn detect_by_structure(content: &str) -> Option<Detection> {
    let brace_lines = content.lines().filter(|l| l.trim_end().ends_with('{')).count();
    let colon_block_lines = content
        .lines()
        .filter(|l| l.trim_end().ends_with(':'))
        .count();
    if colon_block_lines > brace_lines && colon_block_lines > 0 {
        Some(Detection {
            language: Language::Python,
            confidence: 0.7,
        })
    } else if brace_lines > 0 {
        Some(Detection {
            language: Language::Rust,
            confidence: 0.7,
        })
    } else {
        None
    }
}

/// Fallback cascade: extension → backup/temp suffix → shebang → syntax
/// patterns → structure. Each stage is tried in order and the first result
/// meeting `confidence_threshold` wins. Unlike an extension/shebang match,
/// a candidate that never clears the threshold is not returned at all —
/// the caller's gated fallback (spec §4.5 step 4) treats `None` as "generic
/// text", not as a license to act on a signal nobody trusts.
pub fn detect_language(
    file_name: &str,
    content: &str,
    confidence_threshold: f32,
) -> Option<Detection> {
    let candidates = [
        detect_by_extension(file_name),
        detect_backup(file_name, content),
        detect_by_shebang(content),
        detect_by_syntax_patterns(content),
        detect_by_structure(content),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|d| d.confidence >= confidence_threshold)
}

pub fn detect_language_default(file_name: &str, content: &str) -> Option<Detection> {
    detect_language(file_name, content, DEFAULT_CONFIDENCE_THRESHOLD)
}
