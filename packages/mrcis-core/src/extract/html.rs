//! HTML extractor (§4.F table row 11): ids, classes, script `src`s, link
//! `href`s, and `data-*` attributes as variables carrying an `id:`,
//! `class:`, `script:`, `link:`, or `data:` qualified-name prefix. No
//! tree-sitter-html grammar is in the workspace, so this is regex-based,
//! same approach as the Dockerfile extractor.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{CodeEntity, EntityKind};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::stable_entity_id;
use super::Extractor;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([a-zA-Z][a-zA-Z0-9-]*)((?:\s+[^<>]*?)?)/?>").unwrap());
static ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*"([^"]*)"|([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*'([^']*)'"#).unwrap());

pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn supports(&self, path: &Path) -> bool {
        matches!(path.extension().and_then(|e| e.to_str()), Some("html") | Some("htm"))
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let started = std::time::Instant::now();
        let mut result = ExtractionResult::empty(ctx, "html");
        let source = ctx.source_text();

        let mut seen: HashSet<String> = HashSet::new();

        for tag_caps in TAG_RE.captures_iter(&source) {
            let tag_name = tag_caps.get(1).map(|m| m.as_str()).unwrap_or("").to_ascii_lowercase();
            let attrs_text = tag_caps.get(2).map(|m| m.as_str()).unwrap_or("");

            for attr_caps in ATTR_RE.captures_iter(attrs_text) {
                let (name, value) = if let Some(n) = attr_caps.get(1) {
                    (n.as_str(), attr_caps.get(2).map(|m| m.as_str()).unwrap_or(""))
                } else {
                    (attr_caps.get(3).map(|m| m.as_str()).unwrap_or(""), attr_caps.get(4).map(|m| m.as_str()).unwrap_or(""))
                };
                let name_lower = name.to_ascii_lowercase();

                // HTML parsing here does not track positions, so every
                // entity gets line_start == line_end == 1 (§9).
                match name_lower.as_str() {
                    "id" => push_variable(&mut result, ctx, &mut seen, "id", value),
                    "class" => {
                        for class in value.split_whitespace() {
                            push_variable(&mut result, ctx, &mut seen, "class", class);
                        }
                    }
                    "src" if tag_name == "script" => push_variable(&mut result, ctx, &mut seen, "script", value),
                    "href" if tag_name == "link" => push_variable(&mut result, ctx, &mut seen, "link", value),
                    _ if name_lower.starts_with("data-") => push_variable(&mut result, ctx, &mut seen, "data", &name_lower),
                    _ => {}
                }
            }
        }

        result.extraction_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["html", "htm"]
    }

    fn language_name(&self) -> &'static str {
        "html"
    }
}

fn push_variable(result: &mut ExtractionResult, ctx: &ExtractionContext, seen: &mut HashSet<String>, prefix: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let qualified_name = format!("{prefix}:{value}");
    if !seen.insert(qualified_name.clone()) {
        return;
    }
    let id = stable_entity_id(&ctx.file_id, "variable", &qualified_name);
    result.entities.push(CodeEntity::new(
        id,
        ctx.repository_id.clone(),
        ctx.file_id.clone(),
        qualified_name,
        value.to_string(),
        EntityKind::Variable,
        "html",
        1,
        1,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ids_classes_scripts_links_and_data_attrs() {
        let source = r#"<html>
<head><link rel="stylesheet" href="styles.css"></head>
<body>
<div id="main" class="container primary" data-role="app"></div>
<script src="app.js"></script>
</body>
</html>"#;
        let ctx = ExtractionContext::new("index.html", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = HtmlExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.qualified_name == "id:main"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "class:container"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "class:primary"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "script:app.js"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "link:styles.css"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "data:data-role"));
    }
}
