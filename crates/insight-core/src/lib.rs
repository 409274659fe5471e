//! Insight Core - Domain models, errors, and shared traits
//!
//! This crate defines the core abstractions used throughout the system:
//! - Document chunks and KPI records
//! - Domain error kinds with cause chains
//! - The text generator trait implemented by the generation backends
//! - Configuration management
//! - Logging setup

pub mod config;
pub mod telemetry;

pub use config::{
    AppConfig, ConfigError, EmbeddingBackend, EmbeddingConfig, GeneratorBackend,
    GeneratorConfig, LoggingConfig, PathsConfig, RagConfig, ServerConfig,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Boxed cause carried by the wrapping error kinds
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Domain error kinds
///
/// The wrapping kinds (`Ingestion`, `Training`, `Rag`) keep the message of
/// the error they wrap and, when available, the error itself as `source`.
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Data ingestion failed: {message}")]
    Ingestion {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Model training failed: {message}")]
    Training {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("RAG error: {message}")]
    Rag {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Analytics error: {0}")]
    Analytics(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("{resource} not found. Run `insight {step}` first.")]
    MissingPrerequisite { resource: String, step: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, InsightError>;

/// Discriminant of [`InsightError`], handy for matching without payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Ingestion,
    Training,
    Rag,
    Config,
    Analytics,
    Prediction,
    Database,
    MissingPrerequisite,
    Other,
}

impl InsightError {
    /// Ingestion failure without an underlying error
    pub fn ingestion(message: impl Into<String>) -> Self {
        Self::Ingestion {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an error as an ingestion failure
    pub fn ingestion_from<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Ingestion {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Training failure without an underlying error
    pub fn training(message: impl Into<String>) -> Self {
        Self::Training {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an error as a training failure
    pub fn training_from<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Training {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// RAG failure without an underlying error
    pub fn rag(message: impl Into<String>) -> Self {
        Self::Rag {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an error as a RAG failure
    pub fn rag_from<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Rag {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Re-wrap as a RAG failure; an existing RAG failure is returned as is
    pub fn into_rag(self) -> Self {
        match self {
            Self::Rag { .. } => self,
            other => Self::rag_from(other),
        }
    }

    /// Missing on-disk prerequisite produced by an earlier pipeline step
    pub fn missing(resource: impl Into<String>, step: impl Into<String>) -> Self {
        Self::MissingPrerequisite {
            resource: resource.into(),
            step: step.into(),
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ingestion { .. } => ErrorKind::Ingestion,
            Self::Training { .. } => ErrorKind::Training,
            Self::Rag { .. } => ErrorKind::Rag,
            Self::Config(_) => ErrorKind::Config,
            Self::Analytics(_) => ErrorKind::Analytics,
            Self::Prediction(_) => ErrorKind::Prediction,
            Self::Database(_) => ErrorKind::Database,
            Self::MissingPrerequisite { .. } => ErrorKind::MissingPrerequisite,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}

impl From<ConfigError> for InsightError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

// ============================================================================
// Document Models
// ============================================================================

/// A fixed-width slice of a source document, the unit of embedding
///
/// `chunk_index` orders the chunks of one source; concatenating a source's
/// chunks by index reproduces its extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// File name of the source document
    pub source: String,

    /// Position of this chunk within its source
    pub chunk_index: usize,

    /// Chunk text
    pub text: String,
}

impl DocumentChunk {
    /// Create a new chunk
    pub fn new(source: impl Into<String>, chunk_index: usize, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            chunk_index,
            text: text.into(),
        }
    }
}

// ============================================================================
// Analytics Models
// ============================================================================

/// Metric name for the sales sum
pub const KPI_TOTAL_SALES: &str = "total_sales";

/// Metric name for the mean discount
pub const KPI_AVG_DISCOUNT: &str = "avg_discount";

/// Metric name for the row count
pub const KPI_ORDERS: &str = "orders";

/// One row of the KPI table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    pub metric: String,
    pub value: f64,
}

impl KpiRecord {
    pub fn new(metric: impl Into<String>, value: f64) -> Self {
        Self {
            metric: metric.into(),
            value,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for text generation backends
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
