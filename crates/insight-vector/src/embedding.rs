//! Embedding clients
//!
//! Two backends produce sentence vectors:
//! - `LocalBertEmbedding`: in-process BERT encoder (candle), mean pooled and
//!   L2 normalized
//! - `OllamaEmbedding`: HTTP call to a local Ollama server
//!
//! `LazyEmbeddingClient` defers construction of either backend to first use
//! and guarantees it happens once.
//!
//! Author: hephaex@gmail.com

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use insight_core::{EmbeddingBackend, EmbeddingConfig, InsightError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;

use crate::distance::l2_normalize;

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
///
/// Output vector `i` corresponds to input text `i`.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model name for logging
    fn name(&self) -> &str;
}

fn load_error(what: &str, e: impl Display) -> InsightError {
    InsightError::rag(format!("Failed to load embedding model ({what}): {e}"))
}

fn inference_error(e: impl Display) -> InsightError {
    InsightError::rag(format!("Embedding inference failed: {e}"))
}

// ============================================================================
// Local BERT Encoder
// ============================================================================

/// Sentence encoder running in-process on the CPU
///
/// Forward passes run on the blocking thread pool.
pub struct LocalBertEmbedding {
    encoder: Arc<BertEncoder>,
    model_id: String,
}

struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LocalBertEmbedding {
    /// Download (or reuse the cached) model from the Hugging Face hub and load it
    ///
    /// Blocking; call from a blocking-capable thread.
    pub fn new(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        tracing::info!(model = model_id, "Loading local embedding model");

        let api = Api::new().map_err(|e| load_error("hub", e))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| load_error("config.json", e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| load_error("tokenizer.json", e))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| load_error("model.safetensors", e))?;

        let config_contents =
            std::fs::read_to_string(&config_path).map_err(|e| load_error("read config", e))?;
        let config: BertConfig =
            serde_json::from_str(&config_contents).map_err(|e| load_error("parse config", e))?;

        let mut tokenizer =
            Tokenizer::from_file(&tokenizer_path).map_err(|e| load_error("tokenizer", e))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: config.max_position_embeddings,
                ..Default::default()
            }))
            .map_err(|e| load_error("truncation", e))?;

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(|e| load_error("weights", e))?
        };
        let model = BertModel::load(vb, &config).map_err(|e| load_error("model", e))?;

        tracing::info!(model = model_id, "Local embedding model loaded");

        Ok(Self {
            encoder: Arc::new(BertEncoder {
                model,
                tokenizer,
                device,
            }),
            model_id: model_id.to_string(),
        })
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let encoder = Arc::clone(&self.encoder);
        tokio::task::spawn_blocking(move || encoder.encode_texts(&texts))
            .await
            .map_err(|e| InsightError::rag(format!("Embedding task failed: {e}")))?
    }
}

impl BertEncoder {
    fn encode_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(inference_error)?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = texts.len();

        let mut input_ids = Vec::with_capacity(batch_size * max_len);
        let mut type_ids = Vec::with_capacity(batch_size * max_len);
        let mut attention = Vec::with_capacity(batch_size * max_len);

        for encoding in &encodings {
            let pad_len = max_len - encoding.get_ids().len();
            input_ids.extend_from_slice(encoding.get_ids());
            input_ids.extend(std::iter::repeat(0u32).take(pad_len));
            type_ids.extend_from_slice(encoding.get_type_ids());
            type_ids.extend(std::iter::repeat(0u32).take(pad_len));
            attention.extend_from_slice(encoding.get_attention_mask());
            attention.extend(std::iter::repeat(0u32).take(pad_len));
        }

        let shape = (batch_size, max_len);
        let input_ids = Tensor::from_vec(input_ids, shape, &self.device).map_err(inference_error)?;
        let type_ids = Tensor::from_vec(type_ids, shape, &self.device).map_err(inference_error)?;
        let attention = Tensor::from_vec(attention, shape, &self.device).map_err(inference_error)?;

        let hidden = self
            .model
            .forward(&input_ids, &type_ids, Some(&attention))
            .and_then(|t| t.to_dtype(DType::F32))
            .map_err(inference_error)?;

        // Mean pooling over real tokens
        let mask = attention.to_dtype(DType::F32).map_err(inference_error)?;
        let summed = hidden
            .broadcast_mul(&mask.unsqueeze(2).map_err(inference_error)?)
            .and_then(|t| t.sum(1))
            .map_err(inference_error)?;
        let counts = mask
            .sum(1)
            .and_then(|t| t.unsqueeze(1))
            .map_err(inference_error)?;
        let pooled = summed.broadcast_div(&counts).map_err(inference_error)?;

        let mut results = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let mut values: Vec<f32> = pooled
                .get(i)
                .and_then(|row| row.to_vec1())
                .map_err(inference_error)?;
            l2_normalize(&mut values);
            results.push(values);
        }
        Ok(results)
    }
}

#[async_trait]
impl EmbeddingClient for LocalBertEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| InsightError::rag("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.encode(texts.to_vec()).await
    }

    fn name(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.ollama_model.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| InsightError::rag(format!("Ollama embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InsightError::rag(format!(
                "Ollama embedding error: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            InsightError::rag(format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(result.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // No batch endpoint; one request per text, in order
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Lazy wrapper
// ============================================================================

/// Builds the configured backend on first use, exactly once
pub struct LazyEmbeddingClient {
    config: EmbeddingConfig,
    inner: OnceCell<Box<dyn EmbeddingClient>>,
}

impl LazyEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            inner: OnceCell::new(),
        }
    }

    /// Whether the backend has been constructed yet
    pub fn is_loaded(&self) -> bool {
        self.inner.initialized()
    }

    async fn client(&self) -> Result<&dyn EmbeddingClient> {
        let client = self
            .inner
            .get_or_try_init(|| build_client(self.config.clone()))
            .await?;
        Ok(client.as_ref())
    }
}

async fn build_client(config: EmbeddingConfig) -> Result<Box<dyn EmbeddingClient>> {
    match config.backend {
        EmbeddingBackend::Local => {
            let model_id = config.local_model;
            let model = tokio::task::spawn_blocking(move || LocalBertEmbedding::new(&model_id))
                .await
                .map_err(|e| InsightError::rag(format!("Embedding model loader panicked: {e}")))??;
            Ok(Box::new(model))
        }
        EmbeddingBackend::Ollama => Ok(Box::new(OllamaEmbedding::from_config(&config))),
    }
}

#[async_trait]
impl EmbeddingClient for LazyEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client().await?.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.client().await?.embed_batch(texts).await
    }

    fn name(&self) -> &str {
        match self.config.backend {
            EmbeddingBackend::Local => &self.config.local_model,
            EmbeddingBackend::Ollama => &self.config.ollama_model,
        }
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create the configured embedding client; the model loads on first call
pub fn create_embedding_client(config: &EmbeddingConfig) -> Arc<dyn EmbeddingClient> {
    Arc::new(LazyEmbeddingClient::new(config.clone()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_endpoint() {
        let client = OllamaEmbedding::new("http://localhost:11434/", "all-minilm");
        assert_eq!(client.endpoint(), "http://localhost:11434/api/embeddings");
        assert_eq!(client.name(), "all-minilm");
    }

    #[test]
    fn test_lazy_client_does_not_load_on_construction() {
        let client = LazyEmbeddingClient::new(EmbeddingConfig::default());
        assert!(!client.is_loaded());
        assert_eq!(client.name(), "sentence-transformers/all-MiniLM-L6-v2");
    }

    #[tokio::test]
    async fn test_unreachable_ollama_is_rag_error() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Ollama,
            ollama_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = create_embedding_client(&config);

        let err = client.embed("hello").await.unwrap_err();
        assert_eq!(err.kind(), insight_core::ErrorKind::Rag);
    }
}
