//! Extractors (§4.E, §4.F): one polymorphic implementation per language,
//! resolved through a small append-only registry. Grounded on the
//! teacher's `features/parsing/plugins/*` modules for the per-language
//! split, rebuilt against this crate's tagged-union [`crate::model`]
//! instead of the teacher's `Node`/`Edge` graph primitives.

mod config_files;
mod context;
mod dockerfile;
mod fallback;
mod golang;
mod html;
mod java;
mod javascript;
mod js_ts_common;
mod kotlin;
mod markdown;
mod python;
mod ruby;
mod rust_lang;
mod support;
mod typescript;

pub use context::{ExtractionContext, ExtractionResult};

use std::path::Path;

/// Capability set every language extractor implements (§4.F).
pub trait Extractor: Send + Sync {
    fn supports(&self, path: &Path) -> bool;
    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult;
    fn supported_extensions(&self) -> &'static [&'static str];
    fn language_name(&self) -> &'static str;
}

/// Lookup from path to extractor (§4.E). Registration is append-only and
/// idempotent per registry instance; resolution order is (i) extension,
/// (ii) first `supports()` match, (iii) the unknown-language fallback.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// The full mandatory set (§4.F table), in table order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(python::PythonExtractor));
        registry.register(Box::new(typescript::TypeScriptExtractor));
        registry.register(Box::new(javascript::JavaScriptExtractor));
        registry.register(Box::new(golang::GoExtractor));
        registry.register(Box::new(rust_lang::RustExtractor));
        registry.register(Box::new(ruby::RubyExtractor));
        registry.register(Box::new(java::JavaExtractor));
        registry.register(Box::new(kotlin::KotlinExtractor));
        registry.register(Box::new(dockerfile::DockerfileExtractor));
        registry.register(Box::new(config_files::ConfigFileExtractor));
        registry.register(Box::new(html::HtmlExtractor));
        registry.register(Box::new(markdown::MarkdownExtractor));
        registry
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    pub fn resolve(&self, path: &Path) -> &dyn Extractor {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            let ext = ext.to_ascii_lowercase();
            if let Some(found) = self
                .extractors
                .iter()
                .find(|e| e.supported_extensions().contains(&ext.as_str()))
            {
                return found.as_ref();
            }
        }
        if let Some(found) = self.extractors.iter().find(|e| e.supports(path)) {
            return found.as_ref();
        }
        &fallback::UNKNOWN
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn resolves_by_extension_first() {
        let registry = ExtractorRegistry::with_defaults();
        let e = registry.resolve(&PathBuf::from("foo.py"));
        assert_eq!(e.language_name(), "python");
    }

    #[test]
    fn resolves_dockerfile_by_supports() {
        let registry = ExtractorRegistry::with_defaults();
        let e = registry.resolve(&PathBuf::from("Dockerfile"));
        assert_eq!(e.language_name(), "dockerfile");
    }

    #[test]
    fn falls_back_to_unknown() {
        let registry = ExtractorRegistry::with_defaults();
        let e = registry.resolve(&PathBuf::from("data.bin"));
        assert_eq!(e.language_name(), "unknown");
    }
}
