//! Configuration handling for docket.
//!
//! Loaded from `<config_dir>/config.toml`. Every field has a default, so a
//! missing file or a partial one is fine. API keys are never read from the
//! file; they come from `OPENAI_API_KEY`.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generative collaborator configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Flat,
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend to use
    #[serde(default)]
    pub backend: StoreBackend,

    /// Store root (default: `<data_dir>/vector_store`)
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl StoreConfig {
    /// Effective store root.
    pub fn root_dir(&self) -> Option<PathBuf> {
        self.root
            .clone()
            .or_else(|| data_dir().map(|d| d.join("vector_store")))
    }
}

/// Embedding provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Zero vectors; useful only for wiring tests
    Noop,
    /// OpenAI-compatible `/embeddings` endpoint
    #[default]
    OpenAi,
    /// Local all-MiniLM-L6-v2 (requires the `candle` feature)
    Candle,
}

/// Embedding-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Endpoint for the `openai` provider
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Embedding dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Max concurrent embedding jobs
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// L2-normalize embeddings
    #[serde(default = "default_true")]
    pub normalize: bool,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_dimension() -> usize {
    1536
}

fn default_batch_size() -> usize {
    32
}

fn default_max_concurrent() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            base_url: default_openai_base_url(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            normalize: true,
        }
    }
}

/// Generative collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Try the generator before extractive answers
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Deadline for one completion
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    500
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_openai_base_url(),
            model: default_generation_model(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

/// Query-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Collection used when none is given
    #[serde(default = "default_collection")]
    pub default_collection: String,

    /// Default result limit
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Search this many times `top_k` candidates before filtering
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Raw document side files used to resolve modification times
    #[serde(default)]
    pub raw_docs_dir: Option<PathBuf>,
}

fn default_collection() -> String {
    "documents".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_candidate_multiplier() -> usize {
    3
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_collection: default_collection(),
            default_top_k: default_top_k(),
            candidate_multiplier: default_candidate_multiplier(),
            raw_docs_dir: None,
        }
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Chunk budget in estimated tokens
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    1200
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the default location; a missing file yields the defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, or from the default location when `None`.
    pub fn load_from(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.is_some();
        let Some(path) = path.or_else(Self::config_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Default config file path.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.toml"))
    }

    /// Raw docs directory: configured, else `<data_dir>/raw_docs`.
    pub fn raw_docs_dir(&self) -> Option<PathBuf> {
        self.query
            .raw_docs_dir
            .clone()
            .or_else(|| data_dir().map(|d| d.join("raw_docs")))
    }

    /// A commented sample configuration.
    pub fn sample_toml() -> &'static str {
        r#"# docket configuration

[store]
# "flat" persists under root; "memory" keeps everything in-process
backend = "flat"
# root = "/var/lib/docket/vector_store"

[embedding]
# "openai", "candle" (needs the candle feature) or "noop"
provider = "openai"
model = "text-embedding-3-small"
base_url = "https://api.openai.com/v1"
dimension = 1536
batch_size = 32
max_concurrent = 4
normalize = true

[generation]
# Requires OPENAI_API_KEY; without it answers are extractive
enabled = true
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
timeout_secs = 30
max_tokens = 500
temperature = 0.0

[query]
default_collection = "documents"
default_top_k = 5
candidate_multiplier = 3
# raw_docs_dir = "/var/lib/docket/raw_docs"

[ingest]
chunk_size = 1200

[server]
bind = "127.0.0.1:8080"

[logging]
level = "info"
"#
    }
}

/// Get the XDG data directory for docket.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCKET_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "docket").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the XDG config directory for docket.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCKET_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "docket").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the XDG cache directory for docket.
#[cfg_attr(not(feature = "candle"), allow(dead_code))]
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "docket").map(|dirs| dirs.cache_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.backend, StoreBackend::Flat);
        assert_eq!(config.query.default_top_k, 5);
        assert_eq!(config.query.candidate_multiplier, 3);
        assert_eq!(config.ingest.chunk_size, 1200);
        assert_eq!(config.generation.max_tokens, 500);
        assert_eq!(config.embedding.provider, EmbeddingProvider::OpenAi);
    }

    #[test]
    fn test_sample_toml_parses_to_defaults() {
        let parsed: Config = toml::from_str(Config::sample_toml()).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.embedding.model, defaults.embedding.model);
        assert_eq!(parsed.server.bind, defaults.server.bind);
        assert_eq!(parsed.query.default_collection, defaults.query.default_collection);
        assert!(parsed.generation.enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[store]\nbackend = \"memory\"\n\n[embedding]\nprovider = \"noop\"\ndimension = 8\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Noop);
        assert_eq!(config.embedding.dimension, 8);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp_dir = tempdir().unwrap();
        assert!(Config::load_from(Some(temp_dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[store]\nbackend = \"cloud\"\n").unwrap();
        assert!(Config::load_from(Some(path)).is_err());
    }

    #[test]
    fn test_explicit_store_root_wins() {
        let config = Config {
            store: StoreConfig {
                backend: StoreBackend::Flat,
                root: Some(PathBuf::from("/srv/docket")),
            },
            ..Config::default()
        };
        assert_eq!(config.store.root_dir(), Some(PathBuf::from("/srv/docket")));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.query.default_top_k, config.query.default_top_k);
    }
}
