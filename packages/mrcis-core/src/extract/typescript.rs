//! TypeScript/TSX extractor (§4.F table row 2): the JS/TS traversal plus
//! interfaces, type aliases and the exported flag.

use std::path::Path;

use super::context::{ExtractionContext, ExtractionResult};
use super::js_ts_common;
use super::Extractor;

pub struct TypeScriptExtractor;

impl Extractor for TypeScriptExtractor {
    fn supports(&self, path: &Path) -> bool {
        matches!(path.extension().and_then(|e| e.to_str()), Some("ts") | Some("tsx"))
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let is_tsx = ctx.file_path.ends_with(".tsx");
        let language = if is_tsx {
            tree_sitter_typescript::language_tsx()
        } else {
            tree_sitter_typescript::language_typescript()
        };
        js_ts_common::extract(ctx, language, "typescript", true)
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx"]
    }

    fn language_name(&self) -> &'static str {
        "typescript"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;

    #[test]
    fn extracts_interface_and_exported_class() {
        let source = "export interface Greeter {\n  greet(): string;\n}\n\nexport class Hello implements Greeter {\n  greet() {\n    return \"hi\";\n  }\n}\n";
        let ctx = ExtractionContext::new("src/hello.ts", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = TypeScriptExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.kind == EntityKind::Interface && e.simple_name == "Greeter"));
        assert!(result.entities.iter().any(|e| e.kind == EntityKind::Class && e.is_exported));
    }
}
