use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the whole answering service.
///
/// Every section falls back to its defaults when omitted from `config.yaml`,
/// so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub storage: StorageConfig,
    pub retrieval: RetrievalConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
}

/// Configuration for the generation model (Ollama).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    pub context_length: usize,
    /// Upper bound for a single generation call, passed to the HTTP client.
    pub timeout_secs: u64,
}

/// Configuration for the embedding model.
///
/// `dimension` must match the vector size of the Qdrant collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub base_url: String,
    pub dimension: usize,
}

/// Vector database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// gRPC endpoint of the Qdrant server
    pub url: String,
    /// Collection holding the passage vectors
    pub collection_name: String,
}

/// Request defaults for the ask operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub score_threshold: f32,
    pub exact_search: bool,
    pub max_per_doc: usize,
}

/// Configuration for knowledge base ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Points buffered before each upsert
    pub batch_size: usize,
    /// File extensions to ingest, without the leading dot
    pub extensions: Vec<String>,
    /// Paths with a component containing one of these strings are skipped
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "phi3:mini".to_string(),
            base_url: "http://localhost:11434".to_string(),
            temperature: 0.2,
            context_length: 4096,
            timeout_secs: 120,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-minilm".to_string(),
            base_url: "http://localhost:11434".to_string(),
            dimension: 384,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            collection_name: "kb_en".to_string(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            score_threshold: 0.5,
            exact_search: false,
            max_per_doc: 2,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 120,
            batch_size: 128,
            extensions: vec!["md".to_string(), "txt".to_string()],
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/groundline.sock".to_string(),
        }
    }
}

fn default_exclude_patterns() -> Vec<String> {
    [".git", ".svn", ".hg", "node_modules", "target", ".venv", "__pycache__", ".DS_Store"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `config.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("config.yaml").unwrap_or_default()
    }

    /// Rejects settings that would only fail later, deep inside a request.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid("embedding.dimension must be > 0".into()));
        }
        if self.ingest.chunk_size == 0 {
            return Err(ConfigError::Invalid("ingest.chunk_size must be > 0".into()));
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.ingest.batch_size == 0 {
            return Err(ConfigError::Invalid("ingest.batch_size must be > 0".into()));
        }
        if self.retrieval.top_k == 0 || self.retrieval.max_per_doc == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.top_k and retrieval.max_per_doc must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_defaults() {
        let config = RetrievalConfig::default();
        assert_eq!(config.top_k, 4);
        assert_eq!(config.score_threshold, 0.5);
        assert!(!config.exact_search);
        assert_eq!(config.max_per_doc, 2);
    }

    #[test]
    fn test_ingest_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 120);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.extensions, vec!["md", "txt"]);
    }

    #[test]
    fn test_storage_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.collection_name, "kb_en");
        assert_eq!(config.url, "http://localhost:6334");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "llm:\n  model: llama3.2\nstorage:\n  collection_name: docs\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert_eq!(config.storage.collection_name, "docs");
        assert_eq!(config.embedding.dimension, 384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_overlap_larger_than_chunk() {
        let mut config = Config::default();
        config.ingest.chunk_overlap = 800;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_dimension() {
        let mut config = Config::default();
        config.embedding.dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "retrieval:\n  top_k: 6\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.retrieval.top_k, 6);
        assert_eq!(config.retrieval.max_per_doc, 2);
    }
}
