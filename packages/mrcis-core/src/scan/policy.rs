//! Static tables backing the inclusion policy (§4.D steps 2, 3 and 7).

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Directory segments never descended into, regardless of configuration.
pub const ALWAYS_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".mrcis",
    "__pycache__",
    ".pytest_cache",
    "node_modules",
    ".venv",
    "vendor",
    "dist",
    "build",
];

/// Extensions treated as binary/generated and never indexed.
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    "pyc", "so", "dll", "exe", "class", "jar", "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg",
    "pdf", "zip", "tar", "gz", "bz2", "7z", "rar", "woff", "woff2", "ttf", "eot", "wasm",
];

/// Filenames with no extension that are still indexable (matched exactly,
/// case-sensitive — matching the conventional casing of each tool).
pub const EXTENSIONLESS_INDEXABLE_NAMES: &[&str] = &["Dockerfile", "Rakefile", "Gemfile", "Makefile"];

pub static INDEXABLE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "py", "pyi", "ts", "tsx", "js", "jsx", "go", "rs", "rb", "rake", "java", "kt", "json",
        "yaml", "yml", "toml", "html", "htm", "md", "markdown",
    ]
    .into_iter()
    .collect()
});

pub fn is_excluded_extension(ext: &str) -> bool {
    EXCLUDED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

pub fn is_indexable_extension(ext: &str) -> bool {
    INDEXABLE_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str())
}

pub fn is_extensionless_indexable(file_name: &str) -> bool {
    EXTENSIONLESS_INDEXABLE_NAMES.contains(&file_name) || file_name.starts_with("Dockerfile.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn extension_checks_are_case_insensitive(ext in "[a-zA-Z]{1,8}") {
            prop_assert_eq!(is_excluded_extension(&ext), is_excluded_extension(&ext.to_ascii_uppercase()));
            prop_assert_eq!(is_indexable_extension(&ext), is_indexable_extension(&ext.to_ascii_uppercase()));
        }

        #[test]
        fn no_extension_is_both_excluded_and_indexable(ext in "[a-zA-Z0-9]{1,8}") {
            prop_assert!(!(is_excluded_extension(&ext) && is_indexable_extension(&ext)));
        }
    }
}
