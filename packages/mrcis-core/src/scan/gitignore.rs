//! Gitignore composition, grounded on `dk-cli`'s use of the `ignore` crate
//! for inclusion filtering (the teacher itself has no gitignore handling;
//! `original_source/.../pathspec`-based `GitignoreFilter` confirms the
//! exact precedence this module follows: built-ins, then git-root
//! `.gitignore`, then repository-root `.gitignore`, last match wins).

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Always-ignored regardless of `.gitignore` contents or `respect_gitignore`.
const BUILTIN_IGNORES: &[&str] = &[".git/", ".mrcis/"];

pub struct GitignoreFilter {
    matcher: Gitignore,
}

impl GitignoreFilter {
    /// Build a filter for `repo_root`, optionally layering in the
    /// repository's own `.gitignore` and that of the enclosing git
    /// worktree (found by walking up from `repo_root` until a `.git`
    /// entry is found).
    pub fn build(repo_root: &Path, respect_gitignore: bool) -> Self {
        let mut builder = GitignoreBuilder::new(repo_root);
        for pattern in BUILTIN_IGNORES {
            // Built-in patterns are well-formed; a failure here is a bug.
            let _ = builder.add_line(None, pattern);
        }

        if respect_gitignore {
            if let Some(git_root) = find_git_root(repo_root) {
                if git_root != repo_root {
                    let _ = builder.add(git_root.join(".gitignore"));
                }
            }
            let _ = builder.add(repo_root.join(".gitignore"));
        }

        let matcher = builder.build().unwrap_or_else(|_| Gitignore::empty());
        Self { matcher }
    }

    /// Returns true if `path` (absolute, or relative to the root the
    /// filter was built with) should be excluded from indexing.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.matcher.matched(path, is_dir).is_ignore()
    }
}

fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    loop {
        if current.join(".git").exists() {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn builtin_git_directory_is_always_ignored() {
        let dir = tempdir().unwrap();
        let filter = GitignoreFilter::build(dir.path(), false);
        assert!(filter.is_ignored(&dir.path().join(".git"), true));
        assert!(filter.is_ignored(&dir.path().join(".mrcis"), true));
    }

    #[test]
    fn repo_gitignore_is_respected_when_enabled() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "target/\n*.log\n").unwrap();
        let filter = GitignoreFilter::build(dir.path(), true);
        assert!(filter.is_ignored(&dir.path().join("target"), true));
        assert!(filter.is_ignored(&dir.path().join("debug.log"), false));
        assert!(!filter.is_ignored(&dir.path().join("src/main.rs"), false));
    }

    #[test]
    fn repo_gitignore_is_ignored_when_disabled() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        let filter = GitignoreFilter::build(dir.path(), false);
        assert!(!filter.is_ignored(&dir.path().join("debug.log"), false));
    }
}
