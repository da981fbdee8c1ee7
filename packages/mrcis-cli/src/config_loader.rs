//! Composes defaults, an optional YAML file and `MRCIS_`-prefixed
//! environment overrides into one validated [`Config`] (§6). Every other
//! crate only ever consumes the result; this is the one place that knows
//! about files and environment variables (§4.G's source language used
//! Pydantic settings for the equivalent composition).

use std::path::Path;

use anyhow::{Context, Result};
use mrcis_core::config::Config;

const ENV_PREFIX: &str = "MRCIS_";
const ENV_NESTED_DELIMITER: &str = "__";

pub fn load(config_path: Option<&Path>) -> Result<Config> {
    let mut value = serde_json::to_value(Config::default()).context("failed to serialize default configuration")?;

    if let Some(path) = config_path {
        let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read config file {}", path.display()))?;
        let file_value: serde_json::Value = serde_yaml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))?;
        merge(&mut value, file_value);
    }

    apply_env_overrides(&mut value);

    let config: Config = serde_json::from_value(value).context("failed to materialize configuration")?;
    config.validate()?;
    Ok(config)
}

/// Recursive merge: objects are merged key-by-key, everything else in
/// `incoming` replaces what's in `base`.
fn merge(base: &mut serde_json::Value, incoming: serde_json::Value) {
    match (base, incoming) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                merge(base_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (base, incoming) => *base = incoming,
    }
}

/// Scans the process environment for `MRCIS_`-prefixed variables, maps
/// `FOO__BAR__BAZ` to the `foo.bar.baz` path and sets it on `value`,
/// parsing the variable's text as JSON first so booleans/numbers survive
/// and falling back to a plain string otherwise.
fn apply_env_overrides(value: &mut serde_json::Value) {
    for (key, raw) in std::env::vars() {
        let Some(rest) = key.strip_prefix(ENV_PREFIX) else { continue };
        let path: Vec<String> = rest.split(ENV_NESTED_DELIMITER).map(|s| s.to_lowercase()).collect();
        if path.is_empty() || path.iter().any(|segment| segment.is_empty()) {
            continue;
        }
        let parsed = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
        set_path(value, &path, parsed);
    }
}

fn set_path(value: &mut serde_json::Value, path: &[String], new_value: serde_json::Value) {
    let serde_json::Value::Object(map) = value else { return };
    if path.len() == 1 {
        map.insert(path[0].clone(), new_value);
        return;
    }
    let child = map.entry(path[0].clone()).or_insert(serde_json::Value::Object(Default::default()));
    set_path(child, &path[1..], new_value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overlays_nested_values_without_dropping_siblings() {
        let mut base = serde_json::json!({"server": {"host": "127.0.0.1", "port": 8765}});
        let incoming = serde_json::json!({"server": {"port": 9000}});
        merge(&mut base, incoming);
        assert_eq!(base["server"]["host"], "127.0.0.1");
        assert_eq!(base["server"]["port"], 9000);
    }

    #[test]
    fn env_override_sets_nested_path() {
        let mut value = serde_json::json!({"embedding": {"model": "text-embedding-3-small"}});
        set_path(&mut value, &["embedding".to_string(), "model".to_string()], serde_json::json!("custom-model"));
        assert_eq!(value["embedding"]["model"], "custom-model");
    }

    #[test]
    fn loads_defaults_when_no_file_is_given() {
        let config = load(None).unwrap();
        assert_eq!(config.server.port, 8765);
    }
}
