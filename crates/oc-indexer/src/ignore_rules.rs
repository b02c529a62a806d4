use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::scanner::{GENERATED_PATTERNS, VENDOR_DIRS};

/// Composed ignore matcher for one project root.
///
/// Layers, in increasing priority: built-in vendor/generated-file defaults,
/// the root `.gitignore`, any depth-1 subdirectory `.gitignore`, a root
/// `.indexignore` (gitignore syntax, indexer-specific), and finally
/// caller-supplied user excludes. A later layer's explicit un-ignore
/// (`!pattern`) can override an earlier layer's ignore, matching standard
/// gitignore precedence.
pub struct IgnoreRuleSet {
    root: PathBuf,
    gitignore: Gitignore,
}

impl IgnoreRuleSet {
    /// Build the composed matcher for `project_root`. Never fails on a
    /// missing `.gitignore`/`.indexignore` — absence just means that layer
    /// contributes nothing.
    pub fn build(project_root: &Path, user_excludes: &[String]) -> Self {
        let mut builder = GitignoreBuilder::new(project_root);

        for pattern in VENDOR_DIRS {
            let _ = builder.add_line(None, pattern);
        }
        for pattern in GENERATED_PATTERNS {
            let _ = builder.add_line(None, &format!("*{pattern}*"));
        }

        let _ = builder.add(project_root.join(".gitignore"));

        if let Ok(entries) = std::fs::read_dir(project_root) {
            for entry in entries.flatten() {
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    let nested = entry.path().join(".gitignore");
                    if nested.exists() {
                        let _ = builder.add(nested);
                    }
                }
            }
        }

        let _ = builder.add(project_root.join(".indexignore"));

        for pattern in user_excludes {
            let _ = builder.add_line(None, pattern);
        }

        let gitignore = builder.build().unwrap_or_else(|_| Gitignore::empty());

        Self {
            root: project_root.to_path_buf(),
            gitignore,
        }
    }

    /// Whether `relative_path` (relative to the project root this was built
    /// from) should be excluded from indexing.
    pub fn is_ignored(&self, relative_path: &Path, is_directory: bool) -> bool {
        let absolute = self.root.join(relative_path);
        self.gitignore
            .matched(&absolute, is_directory)
            .is_ignore()
    }
}
