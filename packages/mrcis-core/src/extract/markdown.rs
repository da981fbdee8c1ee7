//! Markdown extractor (§4.F table row 12): headings as `config_section`
//! entities, nested by heading level. Line-oriented, no tree-sitter
//! grammar for this in the workspace.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{CodeEntity, EntityKind};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::stable_entity_id;
use super::Extractor;

static ATX_HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap());

pub struct MarkdownExtractor;

impl Extractor for MarkdownExtractor {
    fn supports(&self, path: &Path) -> bool {
        matches!(path.extension().and_then(|e| e.to_str()), Some("md") | Some("markdown"))
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let started = std::time::Instant::now();
        let mut result = ExtractionResult::empty(ctx, "markdown");
        let source = ctx.source_text();

        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut in_fence = false;

        for (idx, raw_line) in source.lines().enumerate() {
            let line_no = idx as u32 + 1;
            let trimmed = raw_line.trim_start();

            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }

            let caps = match ATX_HEADING_RE.captures(raw_line) {
                Some(c) => c,
                None => continue,
            };
            let level = caps.get(1).map(|m| m.as_str().len()).unwrap_or(1);
            let title = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("").to_string();
            if title.is_empty() {
                continue;
            }

            while stack.last().map(|(l, _)| *l >= level).unwrap_or(false) {
                stack.pop();
            }
            let qualified_name = if stack.is_empty() {
                title.clone()
            } else {
                format!("{}.{}", stack.last().unwrap().1, title)
            };
            stack.push((level, qualified_name.clone()));

            let id = stable_entity_id(&ctx.file_id, "config_section", &qualified_name);
            result.entities.push(CodeEntity::new(
                id,
                ctx.repository_id.clone(),
                ctx.file_id.clone(),
                qualified_name,
                title,
                EntityKind::ConfigSection,
                "markdown",
                line_no,
                line_no,
            ));
        }

        result.extraction_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["md", "markdown"]
    }

    fn language_name(&self) -> &'static str {
        "markdown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_headings() {
        let source = "# Title\n\n## Section A\n\ntext\n\n### Subsection\n\n## Section B\n";
        let ctx = ExtractionContext::new("README.md", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = MarkdownExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.qualified_name == "Title"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "Title.Section A"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "Title.Section A.Subsection"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "Title.Section B"));
    }

    #[test]
    fn ignores_headings_inside_fenced_code_blocks() {
        let source = "# Real\n\n```\n# Not a heading\n```\n";
        let ctx = ExtractionContext::new("README.md", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = MarkdownExtractor.extract(&ctx);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].qualified_name, "Real");
    }
}
