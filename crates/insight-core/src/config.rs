//! Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with defaults suited to running from the project directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Filesystem locations of inputs and artifacts
    pub paths: PathsConfig,

    /// Embedding model configuration
    pub embedding: EmbeddingConfig,

    /// Text generator configuration
    pub generator: GeneratorConfig,

    /// RAG pipeline configuration
    pub rag: RagConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Apply environment variables on top of this configuration
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        // Server
        if let Some(host) = env_string("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("API_PORT")? {
            self.server.port = port;
        }
        if let Some(origins) = env_string("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Paths
        if let Some(dir) = env_string("INSIGHT_DATA_DIR") {
            self.paths.set_data_dir(dir);
        }
        if let Some(dir) = env_string("INSIGHT_MODELS_DIR") {
            self.paths.set_models_dir(dir);
        }

        // Embedding
        if let Some(backend) = env_parse::<EmbeddingBackend>("EMBEDDING_BACKEND")? {
            self.embedding.backend = backend;
        }
        if let Some(model) = env_string("EMBEDDING_MODEL") {
            match self.embedding.backend {
                EmbeddingBackend::Local => self.embedding.local_model = model,
                EmbeddingBackend::Ollama => self.embedding.ollama_model = model,
            }
        }
        if let Some(url) = env_string("OLLAMA_URL") {
            self.embedding.ollama_url = url;
        }

        // Generator
        if let Some(backend) = env_parse::<GeneratorBackend>("GENERATOR_BACKEND")? {
            self.generator.backend = backend;
        }
        if let Some(bin) = env_string("OLLAMA_BIN") {
            self.generator.ollama_bin = bin;
        }
        if let Some(model) = env_string("OLLAMA_MODEL") {
            self.generator.ollama_model = model;
        }
        if let Some(model) = env_string("HF_MODEL") {
            self.generator.hf_model = model;
        }
        if let Some(file) = env_string("HF_MODEL_FILE") {
            self.generator.hf_model_file = file;
        }
        if let Some(tokenizer) = env_string("HF_TOKENIZER") {
            self.generator.hf_tokenizer = tokenizer;
        }
        if let Some(secs) = env_parse("GENERATION_TIMEOUT_SECS")? {
            self.generator.timeout_secs = Some(secs);
        }

        // RAG
        if let Some(k) = env_parse("RAG_TOP_K")? {
            self.rag.top_k = k;
        }
        if let Some(size) = env_parse::<usize>("CHUNK_SIZE")? {
            if size == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "CHUNK_SIZE".to_string(),
                    value: "0".to_string(),
                });
            }
            self.rag.chunk_size = size;
        }

        // Logging
        if let Some(level) = env_string("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = env_string("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }
        if let Some(file) = env_string("LOG_FILE") {
            self.logging.file = if file.is_empty() {
                None
            } else {
                Some(PathBuf::from(file))
            };
        }

        Ok(self)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS (empty allows any origin)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![],
        }
    }
}

/// Locations of pipeline inputs and artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the raw CSV exports
    pub raw_dir: PathBuf,

    /// Directory holding the documents to index
    pub docs_dir: PathBuf,

    /// SQLite database file
    pub database: PathBuf,

    /// Vector index blob
    pub index: PathBuf,

    /// Chunk metadata blob (positionally aligned with the index)
    pub metadata: PathBuf,

    /// Serialized churn classifier
    pub model: PathBuf,

    /// Ordered feature-column list used at training time
    pub features: PathBuf,
}

impl PathsConfig {
    /// Lay out every path under the given data and models directories
    pub fn rooted(data_dir: impl AsRef<Path>, models_dir: impl AsRef<Path>) -> Self {
        let mut paths = Self::default();
        paths.set_data_dir(data_dir);
        paths.set_models_dir(models_dir);
        paths
    }

    /// Re-root the data files under `dir`
    pub fn set_data_dir(&mut self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref();
        self.raw_dir = dir.join("raw");
        self.docs_dir = dir.join("docs");
        self.database = dir.join("sales_insights.db");
        self.index = dir.join("faiss.index");
        self.metadata = dir.join("docs_meta.json");
    }

    /// Re-root the model artifacts under `dir`
    pub fn set_models_dir(&mut self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref();
        self.model = dir.join("churn_gbdt.json");
        self.features = dir.join("churn_features.json");
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            docs_dir: PathBuf::from("data/docs"),
            database: PathBuf::from("data/sales_insights.db"),
            index: PathBuf::from("data/faiss.index"),
            metadata: PathBuf::from("data/docs_meta.json"),
            model: PathBuf::from("models/churn_gbdt.json"),
            features: PathBuf::from("models/churn_features.json"),
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding backend to use
    pub backend: EmbeddingBackend,

    /// Hugging Face repository of the in-process sentence encoder
    pub local_model: String,

    /// Ollama server URL
    pub ollama_url: String,

    /// Ollama embedding model name
    pub ollama_model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Local,
            local_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "all-minilm".to_string(),
        }
    }
}

/// Supported embedding backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Local,
    Ollama,
}

impl FromStr for EmbeddingBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "EMBEDDING_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Text generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Generator backend to use
    pub backend: GeneratorBackend,

    /// Model runner executable for the `ollama` backend
    pub ollama_bin: String,

    /// Model name passed to the model runner
    pub ollama_model: String,

    /// Hugging Face repository holding the GGUF weights for the `hf` backend
    pub hf_model: String,

    /// GGUF file inside `hf_model`
    pub hf_model_file: String,

    /// Hugging Face repository holding `tokenizer.json`
    pub hf_tokenizer: String,

    /// Maximum number of new tokens for the `hf` backend
    pub max_new_tokens: usize,

    /// Upper bound on a single generation call, unbounded when absent
    pub timeout_secs: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::Ollama,
            ollama_bin: "ollama".to_string(),
            ollama_model: "mistral".to_string(),
            hf_model: "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF".to_string(),
            hf_model_file: "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf".to_string(),
            hf_tokenizer: "TinyLlama/TinyLlama-1.1B-Chat-v1.0".to_string(),
            max_new_tokens: 150,
            timeout_secs: None,
        }
    }
}

/// Supported generator backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// Local model-runner process
    Ollama,
    /// In-process text generation
    Hf,
}

impl FromStr for GeneratorBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hf" => Ok(Self::Hf),
            _ => Err(ConfigError::InvalidValue {
                key: "GENERATOR_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for GeneratorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::Hf => write!(f, "hf"),
        }
    }
}

/// RAG pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,

    /// Chunk width in characters
    pub chunk_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            chunk_size: 800,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for console logs
    pub json_format: bool,

    /// Append logs to this file as well as the console
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file: Some(PathBuf::from("logs/app.log")),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.rag.chunk_size, 800);
        assert_eq!(config.generator.backend, GeneratorBackend::Ollama);
        assert_eq!(config.generator.ollama_model, "mistral");
        assert_eq!(config.generator.max_new_tokens, 150);
        assert!(config.generator.timeout_secs.is_none());
    }

    #[test]
    fn test_generator_backend_parse() {
        assert_eq!(
            "ollama".parse::<GeneratorBackend>().unwrap(),
            GeneratorBackend::Ollama
        );
        assert_eq!("HF".parse::<GeneratorBackend>().unwrap(), GeneratorBackend::Hf);

        let err = "openai".parse::<GeneratorBackend>().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, ref value }
                if key == "GENERATOR_BACKEND" && value == "openai"
        ));
    }

    #[test]
    fn test_embedding_backend_parse() {
        assert_eq!(
            "local".parse::<EmbeddingBackend>().unwrap(),
            EmbeddingBackend::Local
        );
        assert!("faiss".parse::<EmbeddingBackend>().is_err());
    }

    #[test]
    fn test_rooted_paths() {
        let paths = PathsConfig::rooted("/tmp/insight/data", "/tmp/insight/models");
        assert_eq!(paths.raw_dir, PathBuf::from("/tmp/insight/data/raw"));
        assert_eq!(
            paths.database,
            PathBuf::from("/tmp/insight/data/sales_insights.db")
        );
        assert_eq!(
            paths.features,
            PathBuf::from("/tmp/insight/models/churn_features.json")
        );
    }

    #[test]
    fn test_partial_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insight.toml");
        std::fs::write(
            &path,
            "[generator]\nbackend = \"hf\"\n\n[rag]\ntop_k = 5\n",
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.generator.backend, GeneratorBackend::Hf);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.rag.chunk_size, 800);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_unknown_backend_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insight.toml");
        std::fs::write(&path, "[generator]\nbackend = \"openai\"\n").unwrap();

        let err = AppConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
