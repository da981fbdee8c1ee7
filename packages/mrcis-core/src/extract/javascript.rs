//! JavaScript/JSX extractor (§4.F table row 3): same traversal as
//! TypeScript with type-bearing constructs (interfaces, type aliases,
//! type annotations) disabled.

use std::path::Path;

use super::context::{ExtractionContext, ExtractionResult};
use super::js_ts_common;
use super::Extractor;

pub struct JavaScriptExtractor;

impl Extractor for JavaScriptExtractor {
    fn supports(&self, path: &Path) -> bool {
        matches!(path.extension().and_then(|e| e.to_str()), Some("js") | Some("jsx"))
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        js_ts_common::extract(ctx, tree_sitter_javascript::language(), "javascript", false)
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["js", "jsx"]
    }

    fn language_name(&self) -> &'static str {
        "javascript"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;

    #[test]
    fn extracts_function_and_call() {
        let source = "function helper() {\n  return 1;\n}\n\nfunction main() {\n  return helper();\n}\n";
        let ctx = ExtractionContext::new("src/main.js", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = JavaScriptExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.kind == EntityKind::Function && e.simple_name == "main"));
        assert!(result.pending_references.iter().any(|r| r.target_qualified_name == "helper"));
    }
}
