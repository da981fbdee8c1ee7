//! Scanner + inclusion policy (§4.D), grounded on the teacher's
//! `file_watcher` module for the walk/filter shape and on `dk-cli`'s use
//! of the `ignore`/`walkdir` crates for glob-aware traversal.

pub mod gitignore;
pub mod paths;
pub mod policy;

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::FilesConfig;
use crate::errors::Result;
use gitignore::GitignoreFilter;

/// Yields files under `repo_root` that the inclusion policy accepts, in
/// the ordered-rejection sequence §4.D describes. Built once per scan
/// pass; cheap to rebuild since it holds no mutable state.
pub struct Scanner<'a> {
    repo_root: PathBuf,
    config: &'a FilesConfig,
    gitignore: GitignoreFilter,
    include: Vec<globset::GlobMatcher>,
    exclude: Vec<globset::GlobMatcher>,
}

impl<'a> Scanner<'a> {
    pub fn new(repo_root: impl Into<PathBuf>, config: &'a FilesConfig) -> Result<Self> {
        let repo_root = repo_root.into();
        let gitignore = GitignoreFilter::build(&repo_root, config.respect_gitignore);
        let include = compile_globs(&config.include_patterns)?;
        let exclude = compile_globs(&config.exclude_patterns)?;
        Ok(Self {
            repo_root,
            config,
            gitignore,
            include,
            exclude,
        })
    }

    /// Walk the repository root and return every path the policy accepts.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut accepted = Vec::new();
        for entry in WalkDir::new(&self.repo_root)
            .into_iter()
            .filter_entry(|e| !self.is_excluded_dir(e.path()))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if self.accepts(path) {
                accepted.push(path.to_path_buf());
            }
        }
        accepted
    }

    /// Re-evaluate a single path against the full policy (used by the
    /// file watcher router, which cannot afford a full tree walk per
    /// event).
    pub fn accepts(&self, path: &Path) -> bool {
        let relative = match path.strip_prefix(&self.repo_root) {
            Ok(r) => r,
            Err(_) => return false,
        };

        // Step 1: must match at least one include glob.
        if !self.include.is_empty() && !self.include.iter().any(|g| g.is_match(relative)) {
            return false;
        }

        // Step 2: always-excluded directory segments.
        if relative
            .components()
            .any(|c| policy::ALWAYS_EXCLUDED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
        {
            return false;
        }

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };
        let extension = path.extension().and_then(|e| e.to_str());

        // Step 3: binary/excluded extensions.
        if let Some(ext) = extension {
            if policy::is_excluded_extension(ext) {
                return false;
            }
        }

        // Step 4: configured exclude globs.
        if self.exclude.iter().any(|g| g.is_match(relative)) {
            return false;
        }

        // Step 5: max file size.
        if let Ok(metadata) = path.metadata() {
            if metadata.len() > self.config.max_file_size_kb * 1024 {
                return false;
            }
        }

        // Step 6: gitignore.
        if self.gitignore.is_ignored(path, false) {
            return false;
        }

        // Step 7: indexable extension, or a known extensionless file.
        match extension {
            Some(ext) => policy::is_indexable_extension(ext),
            None => policy::is_extensionless_indexable(file_name),
        }
    }

    fn is_excluded_dir(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| policy::ALWAYS_EXCLUDED_DIRS.contains(&n))
            .unwrap_or(false)
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<globset::GlobMatcher>> {
    patterns
        .iter()
        .map(|p| {
            globset::Glob::new(p)
                .map(|g| g.compile_matcher())
                .map_err(|e| crate::errors::CoreError::scan(format!("invalid glob '{p}': {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn files_config() -> FilesConfig {
        FilesConfig {
            include_patterns: vec!["**/*".to_string()],
            exclude_patterns: vec![],
            respect_gitignore: true,
            max_file_size_kb: 1024,
        }
    }

    #[test]
    fn rejects_excluded_directory_and_extension() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/pkg.js"), "x").unwrap();
        fs::write(dir.path().join("image.png"), [0u8; 4]).unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let config = files_config();
        let scanner = Scanner::new(dir.path(), &config).unwrap();
        let results = scanner.scan();
        assert!(results.iter().any(|p| p.ends_with("main.rs")));
        assert!(!results.iter().any(|p| p.ends_with("pkg.js")));
        assert!(!results.iter().any(|p| p.ends_with("image.png")));
    }

    #[test]
    fn accepts_known_extensionless_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch").unwrap();
        fs::write(dir.path().join("random_no_ext"), "x").unwrap();

        let config = files_config();
        let scanner = Scanner::new(dir.path(), &config).unwrap();
        assert!(scanner.accepts(&dir.path().join("Dockerfile")));
        assert!(!scanner.accepts(&dir.path().join("random_no_ext")));
    }

    #[test]
    fn rejects_files_over_max_size() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.py"), vec![b'x'; 2048]).unwrap();
        let mut config = files_config();
        config.max_file_size_kb = 1;
        let scanner = Scanner::new(dir.path(), &config).unwrap();
        assert!(!scanner.accepts(&dir.path().join("big.py")));
    }

    #[test]
    fn exclude_glob_overrides_include() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("generated")).unwrap();
        fs::write(dir.path().join("generated/schema.py"), "x").unwrap();
        let mut config = files_config();
        config.exclude_patterns = vec!["generated/**".to_string()];
        let scanner = Scanner::new(dir.path(), &config).unwrap();
        assert!(!scanner.accepts(&dir.path().join("generated/schema.py")));
    }
}
