//! JSON/YAML/TOML extractor (§4.F table row 10): configuration keys as
//! `config_key` entities with dot-notation qualified names. Max depth is
//! per format: 3 for JSON, 5 for YAML, 10 for TOML; array-of-tables
//! entries get an `[i]` suffix.

use std::path::Path;

use crate::model::{CodeEntity, EntityKind};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::stable_entity_id;
use super::Extractor;

pub struct ConfigFileExtractor;

impl Extractor for ConfigFileExtractor {
    fn supports(&self, path: &Path) -> bool {
        matches!(path.extension().and_then(|e| e.to_str()), Some("json") | Some("yaml") | Some("yml") | Some("toml"))
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let started = std::time::Instant::now();
        let extension = Path::new(&ctx.file_path).extension().and_then(|e| e.to_str()).unwrap_or("");
        let (language, max_depth) = match extension {
            "json" => ("json", 3),
            "toml" => ("toml", 10),
            _ => ("yaml", 5),
        };
        let mut result = ExtractionResult::empty(ctx, language);
        let source = ctx.source_text();

        match language {
            "json" => match serde_json::from_str::<serde_json::Value>(&source) {
                Ok(value) => walk_json(&value, "", 0, max_depth, ctx, &mut result),
                Err(e) => result.parse_errors.push(format!("json parse error: {e}")),
            },
            "toml" => match source.parse::<toml::Value>() {
                Ok(value) => walk_toml(&value, "", 0, max_depth, ctx, &mut result),
                Err(e) => result.parse_errors.push(format!("toml parse error: {e}")),
            },
            _ => match serde_yaml::from_str::<serde_yaml::Value>(&source) {
                Ok(value) => walk_yaml(&value, "", 0, max_depth, ctx, &mut result),
                Err(e) => result.parse_errors.push(format!("yaml parse error: {e}")),
            },
        }

        result.extraction_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["json", "yaml", "yml", "toml"]
    }

    fn language_name(&self) -> &'static str {
        "config"
    }
}

fn push_key(qualified_name: &str, simple_name: &str, ctx: &ExtractionContext, result: &mut ExtractionResult, language: &str) {
    let id = stable_entity_id(&ctx.file_id, "config_key", qualified_name);
    result.entities.push(CodeEntity::new(
        id,
        ctx.repository_id.clone(),
        ctx.file_id.clone(),
        qualified_name.to_string(),
        simple_name.to_string(),
        EntityKind::ConfigKey,
        language,
        1,
        1,
    ));
}

fn walk_json(value: &serde_json::Value, prefix: &str, depth: u32, max_depth: u32, ctx: &ExtractionContext, result: &mut ExtractionResult) {
    if depth >= max_depth {
        return;
    }
    if let serde_json::Value::Object(map) = value {
        for (key, child) in map {
            let qualified = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
            push_key(&qualified, key, ctx, result, "json");
            walk_json(child, &qualified, depth + 1, max_depth, ctx, result);
        }
    }
}

fn walk_yaml(value: &serde_yaml::Value, prefix: &str, depth: u32, max_depth: u32, ctx: &ExtractionContext, result: &mut ExtractionResult) {
    if depth >= max_depth {
        return;
    }
    if let serde_yaml::Value::Mapping(map) = value {
        for (key, child) in map {
            let key_str = match key {
                serde_yaml::Value::String(s) => s.clone(),
                other => format!("{other:?}"),
            };
            let qualified = if prefix.is_empty() { key_str.clone() } else { format!("{prefix}.{key_str}") };
            push_key(&qualified, &key_str, ctx, result, "yaml");
            walk_yaml(child, &qualified, depth + 1, max_depth, ctx, result);
        }
    }
}

fn walk_toml(value: &toml::Value, prefix: &str, depth: u32, max_depth: u32, ctx: &ExtractionContext, result: &mut ExtractionResult) {
    if depth >= max_depth {
        return;
    }
    match value {
        toml::Value::Table(map) => {
            for (key, child) in map {
                let qualified = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                push_key(&qualified, key, ctx, result, "toml");
                walk_toml(child, &qualified, depth + 1, max_depth, ctx, result);
            }
        }
        toml::Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if matches!(item, toml::Value::Table(_)) {
                    let qualified = format!("{prefix}[{i}]");
                    walk_toml(item, &qualified, depth + 1, max_depth, ctx, result);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_json_keys_up_to_depth_3() {
        let source = r#"{"server": {"host": "localhost", "port": {"value": {"deep": 1}}}}"#;
        let ctx = ExtractionContext::new("config.json", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = ConfigFileExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.qualified_name == "server.host"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "server.port.value"));
        assert!(!result.entities.iter().any(|e| e.qualified_name == "server.port.value.deep"));
    }

    #[test]
    fn extracts_toml_array_of_tables_with_index_suffix() {
        let source = "[[repositories]]\nname = \"a\"\n\n[[repositories]]\nname = \"b\"\n";
        let ctx = ExtractionContext::new("mrcis.toml", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = ConfigFileExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.qualified_name == "repositories[0].name"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "repositories[1].name"));
    }
}
