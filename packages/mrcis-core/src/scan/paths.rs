//! Path normalization, grounded on `original_source/.../utils/paths.py`:
//! `IndexedFile.path` must be relative to the repository root, forward-slash
//! separated, and must never escape the root.

use std::path::{Component, Path};

/// Normalize `file_path` to a POSIX-style path relative to `repo_root`.
///
/// Returns `None` if `file_path` is not under `repo_root`, or if the
/// relative path would contain a parent (`..`) component — this system
/// never indexes outside a configured repository root.
pub fn normalize_relative(file_path: &Path, repo_root: &Path) -> Option<String> {
    let relative = file_path.strip_prefix(repo_root).ok()?;
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn normalizes_nested_path_to_forward_slashes() {
        let root = PathBuf::from("/repo");
        let file = PathBuf::from("/repo/src/sub/mod.rs");
        assert_eq!(
            normalize_relative(&file, &root),
            Some("src/sub/mod.rs".to_string())
        );
    }

    #[test]
    fn rejects_path_outside_root() {
        let root = PathBuf::from("/repo");
        let file = PathBuf::from("/other/mod.rs");
        assert_eq!(normalize_relative(&file, &root), None);
    }
}
