//! Configuration schema (§6). Shapes and validation live here so every
//! crate in the workspace shares one definition; `mrcis-cli` owns the
//! loader that composes defaults, a YAML file and `MRCIS_`-prefixed
//! environment overrides into one of these.

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

fn err(msg: impl Into<String>) -> CoreError {
    CoreError::config(msg)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Sse,
    Stdio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Stdio,
            host: "127.0.0.1".to_string(),
            port: 8765,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1024..=65535).contains(&self.port) {
            return Err(err(format!(
                "server.port must be in [1024, 65535], got {}",
                self.port
            )));
        }
        if !(5..=300).contains(&self.shutdown_timeout_seconds) {
            return Err(err("server.shutdown_timeout_seconds must be in [5, 300]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/v1".to_string(),
            api_key: String::new(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: 32,
            timeout_seconds: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(err("embedding.api_url must be http(s)"));
        }
        if !(64..=4096).contains(&self.dimensions) {
            return Err(err("embedding.dimensions must be in [64, 4096]"));
        }
        if !(1..=1000).contains(&self.batch_size) {
            return Err(err("embedding.batch_size must be in [1, 1000]"));
        }
        if !(5..=300).contains(&self.timeout_seconds) {
            return Err(err("embedding.timeout_seconds must be in [5, 300]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    SqliteVector,
    GraphBacked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub vector_table_name: String,
    pub state_db_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::SqliteVector,
            data_directory: ".mrcis".to_string(),
            vector_table_name: "entity_vectors".to_string(),
            state_db_name: "state.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    pub path: String,
    pub branch: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub include_patterns: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
}

impl RepositoryConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty() || self.name.len() > 100 {
            return Err(err(format!(
                "repositories[].name must be 1-100 chars, got '{}'",
                self.name
            )));
        }
        let path = std::path::Path::new(&self.path);
        if !path.is_dir() {
            return Err(err(format!(
                "repositories[].path '{}' must exist and be a directory",
                self.path
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub respect_gitignore: bool,
    pub max_file_size_kb: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            include_patterns: vec!["**/*".to_string()],
            exclude_patterns: Vec::new(),
            respect_gitignore: true,
            max_file_size_kb: 1024,
        }
    }
}

impl FilesConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=10240).contains(&self.max_file_size_kb) {
            return Err(err("files.max_file_size_kb must be in [1, 10240]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub max_chunk_chars: usize,
    pub chunk_overlap_chars: usize,
    pub extract_docstrings: bool,
    pub extract_comments: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 4000,
            chunk_overlap_chars: 200,
            extract_docstrings: true,
            extract_comments: false,
        }
    }
}

impl ParserConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(500..=32000).contains(&self.max_chunk_chars) {
            return Err(err("parser.max_chunk_chars must be in [500, 32000]"));
        }
        if self.chunk_overlap_chars > 1000 {
            return Err(err("parser.chunk_overlap_chars must be in [0, 1000]"));
        }
        if self.chunk_overlap_chars >= self.max_chunk_chars {
            return Err(err(
                "parser.chunk_overlap_chars must be < parser.max_chunk_chars",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub resolution_interval_seconds: u64,
    pub watch_debounce_ms: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 3,
            retry_delay_seconds: 5,
            resolution_interval_seconds: 60,
            watch_debounce_ms: 500,
        }
    }
}

impl IndexingConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=500).contains(&self.batch_size) {
            return Err(err("indexing.batch_size must be in [1, 500]"));
        }
        if !(1..=10).contains(&self.max_retries) {
            return Err(err("indexing.max_retries must be in [1, 10]"));
        }
        if !(1..=60).contains(&self.retry_delay_seconds) {
            return Err(err("indexing.retry_delay_seconds must be in [1, 60]"));
        }
        if !(10..=600).contains(&self.resolution_interval_seconds) {
            return Err(err(
                "indexing.resolution_interval_seconds must be in [10, 600]",
            ));
        }
        if !(100..=5000).contains(&self.watch_debounce_ms) {
            return Err(err("indexing.watch_debounce_ms must be in [100, 5000]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Console,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<String>,
    pub rotation: Option<String>,
    pub retention: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Console,
            file: None,
            rotation: None,
            retention: None,
        }
    }
}

/// The full hierarchical configuration (§6). `mrcis-cli` owns the loader
/// that composes defaults, a YAML file and `MRCIS_`-prefixed environment
/// overrides into one of these; every other crate only consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            storage: StorageConfig::default(),
            repositories: Vec::new(),
            files: FilesConfig::default(),
            parser: ParserConfig::default(),
            indexing: IndexingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.server.validate()?;
        self.embedding.validate()?;
        self.files.validate()?;
        self.parser.validate()?;
        self.indexing.validate()?;
        for repo in &self.repositories {
            repo.validate()?;
        }
        let mut names = std::collections::HashSet::new();
        for repo in &self.repositories {
            if !names.insert(repo.name.as_str()) {
                return Err(err(format!("repositories[].name '{}' is not unique", repo.name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_config_rejects_dimensions_out_of_range() {
        let mut cfg = EmbeddingConfig::default();
        cfg.dimensions = 32;
        assert!(cfg.validate().is_err());
        cfg.dimensions = 8192;
        assert!(cfg.validate().is_err());
        cfg.dimensions = 768;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parser_config_rejects_overlap_not_less_than_max() {
        let mut cfg = ParserConfig::default();
        cfg.max_chunk_chars = 1000;
        cfg.chunk_overlap_chars = 1000;
        assert!(cfg.validate().is_err());
        cfg.chunk_overlap_chars = 999;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn server_config_rejects_privileged_port() {
        let mut cfg = ServerConfig::default();
        cfg.port = 80;
        assert!(cfg.validate().is_err());
    }
}
