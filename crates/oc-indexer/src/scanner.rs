use std::path::{Path, PathBuf};

use crate::ignore_rules::IgnoreRuleSet;
use crate::walker::FileWalker;

/// Generated file patterns to skip.
pub(crate) const GENERATED_PATTERNS: &[&str] = &[
    ".generated.",
    ".min.js",
    ".min.css",
    "_pb2.py",
    ".pb.go",
];

/// Vendor directories to skip.
pub(crate) const VENDOR_DIRS: &[&str] = &[
    "vendor",
    "node_modules",
    "third_party",
    ".venv",
    "venv",
];

/// Result of scanning a project directory for source files.
pub struct ScanResult {
    /// Paths relative to project root (forward-slash normalized).
    pub files: Vec<PathBuf>,
    /// Total entries seen (including skipped).
    pub total_entries: usize,
}

/// Scan a project directory for indexable source files, applying no
/// caller-supplied excludes beyond the built-in ignore rules (vendor dirs,
/// generated patterns, `.gitignore`, `.indexignore`).
pub fn scan_files(project_root: &Path) -> ScanResult {
    scan_files_with_excludes(project_root, &[])
}

/// Scan a project directory for indexable source files.
///
/// Built on [`FileWalker`] for the raw directory walk and
/// [`IgnoreRuleSet`] for the ignore decision, so `.indexignore` and
/// caller-supplied `user_excludes` are honored the same way a full
/// project-aware scan needs them to be, not just the bare `.gitignore`
/// support `ignore::WalkBuilder` gives for free.
pub fn scan_files_with_excludes(project_root: &Path, user_excludes: &[String]) -> ScanResult {
    let rules = IgnoreRuleSet::build(project_root, user_excludes);
    let mut files = Vec::new();
    let mut total_entries = 0usize;

    for entry in FileWalker::new(project_root).walk() {
        total_entries += 1;

        if entry.is_directory {
            continue;
        }
        if rules.is_ignored(&entry.relative_path, false) {
            continue;
        }
        if is_generated_file(&entry.relative_path) {
            continue;
        }

        files.push(entry.relative_path);
    }

    ScanResult {
        files,
        total_entries,
    }
}

/// Check if a filename matches generated file patterns.
pub(crate) fn is_generated_file(path: &Path) -> bool {
    let name = match path.file_name() {
        Some(n) => n.to_string_lossy(),
        None => return false,
    };

    for pattern in GENERATED_PATTERNS {
        if name.contains(pattern) {
            return true;
        }
    }
    false
}
