//! Dockerfile extractor (§4.F table row 9): build stages (`FROM ... AS
//! name`) and instruction tasks (`RUN`/`CMD`/…). Line-oriented, no
//! tree-sitter grammar exists for this in the workspace.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{CodeEntity, EntityKind};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::stable_entity_id;
use super::Extractor;

static FROM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^FROM\s+(\S+)(?:\s+AS\s+(\S+))?").unwrap());
const TASK_INSTRUCTIONS: &[&str] = &["RUN", "CMD", "ENTRYPOINT", "COPY", "ADD", "EXPOSE", "ENV", "ARG", "VOLUME", "WORKDIR", "USER", "LABEL", "HEALTHCHECK"];

pub struct DockerfileExtractor;

impl Extractor for DockerfileExtractor {
    fn supports(&self, path: &Path) -> bool {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        file_name == "Dockerfile" || file_name.starts_with("Dockerfile.")
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let started = std::time::Instant::now();
        let mut result = ExtractionResult::empty(ctx, "dockerfile");
        let source = ctx.source_text();

        let mut current_stage: Option<String> = None;
        let mut stage_index = 0usize;
        for (idx, raw_line) in source.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line_no = idx as u32 + 1;

            if let Some(caps) = FROM_RE.captures(line) {
                let base_image = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let stage_name = caps
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| format!("stage{stage_index}"));
                stage_index += 1;
                current_stage = Some(stage_name.clone());

                let id = stable_entity_id(&ctx.file_id, "stage", &stage_name);
                result.entities.push(
                    CodeEntity::new(id, ctx.repository_id.clone(), ctx.file_id.clone(), stage_name, base_image, EntityKind::Stage, "dockerfile", line_no, line_no)
                        .with_source_text(line.to_string()),
                );
                continue;
            }

            let instruction = line.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
            if TASK_INSTRUCTIONS.contains(&instruction.as_str()) {
                let stage = current_stage.clone().unwrap_or_else(|| "stage0".to_string());
                let qualified_name = format!("{stage}.{instruction}@{line_no}");
                let id = stable_entity_id(&ctx.file_id, "task", &qualified_name);
                result.entities.push(
                    CodeEntity::new(id, ctx.repository_id.clone(), ctx.file_id.clone(), qualified_name, instruction, EntityKind::Task, "dockerfile", line_no, line_no)
                        .with_source_text(line.to_string()),
                );
            }
        }

        result.extraction_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn language_name(&self) -> &'static str {
        "dockerfile"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_stages_and_tasks() {
        let source = "FROM rust:1.75 AS builder\nRUN cargo build --release\n\nFROM debian:bookworm-slim\nCOPY --from=builder /app/target/release/app /usr/local/bin/app\nCMD [\"/usr/local/bin/app\"]\n";
        let ctx = ExtractionContext::new("Dockerfile", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = DockerfileExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.kind == EntityKind::Stage && e.qualified_name == "builder"));
        assert!(result.entities.iter().any(|e| e.kind == EntityKind::Task && e.simple_name == "RUN"));
    }
}
