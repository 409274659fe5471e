//! Text generation backends
//!
//! - `OllamaProcessGenerator`: runs the local model runner as a subprocess
//! - `LocalGgufGenerator`: quantized Llama-family model executed in-process
//!
//! Author: hephaex@gmail.com

use std::fmt::Display;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use insight_core::{GeneratorBackend, GeneratorConfig, InsightError, Result, TextGenerator};
use tokenizers::Tokenizer;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;

// ============================================================================
// Model runner subprocess
// ============================================================================

/// Generator that pipes the prompt through `{bin} run {model}`
pub struct OllamaProcessGenerator {
    bin: String,
    model: String,
    timeout: Option<Duration>,
}

impl OllamaProcessGenerator {
    /// Create a new process generator
    pub fn new(bin: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            model: model.into(),
            timeout: None,
        }
    }

    /// Bound the whole call; the child is killed when the bound elapses
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Create from config
    pub fn from_config(config: &GeneratorConfig) -> Self {
        let generator = Self::new(config.ollama_bin.clone(), config.ollama_model.clone());
        match config.timeout_secs {
            Some(secs) => generator.with_timeout(Duration::from_secs(secs)),
            None => generator,
        }
    }

    async fn run(&self, prompt: &str) -> Result<std::process::Output> {
        let mut child = Command::new(&self.bin)
            .arg("run")
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InsightError::rag(format!("Failed to start {}: {e}", self.bin)))?;

        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = prompt.as_bytes().to_vec();
            tokio::spawn(async move {
                stdin.write_all(&bytes).await?;
                stdin.shutdown().await
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| InsightError::rag(format!("Failed to read model output: {e}")))?;

        if let Some(writer) = writer {
            let written = writer
                .await
                .map_err(|e| InsightError::rag(format!("Prompt writer failed: {e}")))?;
            // A failed exit is reported from the status instead
            if let Err(e) = written {
                if output.status.success() {
                    return Err(InsightError::rag(format!("Failed to write prompt: {e}")));
                }
                tracing::debug!(error = %e, "Prompt write interrupted");
            }
        }

        Ok(output)
    }
}

/// Concatenate the `response` fields of newline-delimited JSON objects
///
/// Lines that are not JSON objects with a string `response` are skipped.
pub fn parse_response_lines(stdout: &str) -> String {
    let mut text = String::new();
    for line in stdout.lines() {
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(obj) => {
                if let Some(fragment) = obj.get("response").and_then(|v| v.as_str()) {
                    text.push_str(fragment);
                }
            }
            Err(_) => {
                tracing::trace!(line, "Skipping non-JSON output line");
            }
        }
    }
    text.trim().to_string()
}

#[async_trait]
impl TextGenerator for OllamaProcessGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Running model runner");

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(prompt))
                .await
                .map_err(|_| {
                    InsightError::rag(format!("Ollama generation timed out after {limit:?}"))
                })??,
            None => self.run(prompt).await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let err = InsightError::rag(format!(
                "Ollama generation failed ({}): {}",
                output.status,
                stderr.trim()
            ));
            tracing::error!(error = %err, "Model runner exited with failure");
            return Err(err);
        }

        Ok(parse_response_lines(&String::from_utf8_lossy(&output.stdout)))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ============================================================================
// In-process GGUF model
// ============================================================================

fn hf_error(stage: &str, e: impl Display) -> InsightError {
    InsightError::rag(format!("HF generation failed ({stage}): {e}"))
}

struct GgufModel {
    weights: Mutex<ModelWeights>,
    tokenizer: Tokenizer,
    device: Device,
    eos_token: Option<u32>,
}

impl GgufModel {
    fn load(config: &GeneratorConfig) -> Result<Self> {
        let device = Device::Cpu;
        tracing::info!(
            model = %config.hf_model,
            file = %config.hf_model_file,
            "Loading in-process generator"
        );

        let api = Api::new().map_err(|e| hf_error("hub", e))?;
        let model_path = api
            .repo(Repo::new(config.hf_model.clone(), RepoType::Model))
            .get(&config.hf_model_file)
            .map_err(|e| hf_error("weights download", e))?;
        let tokenizer_path = api
            .repo(Repo::new(config.hf_tokenizer.clone(), RepoType::Model))
            .get("tokenizer.json")
            .map_err(|e| hf_error("tokenizer download", e))?;

        let mut file = std::fs::File::open(&model_path).map_err(|e| hf_error("open weights", e))?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| hf_error("read gguf", e))?;
        let weights = ModelWeights::from_gguf(content, &mut file, &device)
            .map_err(|e| hf_error("load weights", e))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| hf_error("tokenizer", e))?;
        let eos_token = tokenizer.token_to_id("</s>");

        tracing::info!(model = %config.hf_model, "In-process generator loaded");
        Ok(Self {
            weights: Mutex::new(weights),
            tokenizer,
            device,
            eos_token,
        })
    }

    /// Greedy decoding of at most `max_new_tokens`; returns only the continuation
    fn complete(&self, prompt: &str, max_new_tokens: usize) -> Result<String> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| hf_error("tokenize", e))?;
        let prompt_tokens = encoding.get_ids();
        if prompt_tokens.is_empty() || max_new_tokens == 0 {
            return Ok(String::new());
        }

        let mut weights = self
            .weights
            .lock()
            .map_err(|_| InsightError::rag("HF generation failed: model lock poisoned"))?;
        // No temperature: argmax decoding, the seed is unused
        let mut sampler = LogitsProcessor::new(0, None, None);
        let mut generated: Vec<u32> = Vec::with_capacity(max_new_tokens);

        let mut next = {
            let input = Tensor::new(prompt_tokens, &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| hf_error("input", e))?;
            let logits = weights
                .forward(&input, 0)
                .and_then(|t| t.squeeze(0))
                .map_err(|e| hf_error("forward", e))?;
            sampler.sample(&logits).map_err(|e| hf_error("sample", e))?
        };

        while Some(next) != self.eos_token {
            generated.push(next);
            if generated.len() >= max_new_tokens {
                break;
            }
            let position = prompt_tokens.len() + generated.len() - 1;
            let input = Tensor::new(&[next], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| hf_error("input", e))?;
            let logits = weights
                .forward(&input, position)
                .and_then(|t| t.squeeze(0))
                .map_err(|e| hf_error("forward", e))?;
            next = sampler.sample(&logits).map_err(|e| hf_error("sample", e))?;
        }

        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| hf_error("decode", e))?;
        Ok(text.trim().to_string())
    }
}

/// In-process generator, loaded once on first use
pub struct LocalGgufGenerator {
    config: GeneratorConfig,
    model: OnceCell<Arc<GgufModel>>,
}

impl LocalGgufGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            model: OnceCell::new(),
        }
    }

    /// Whether the model has been loaded yet
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<Arc<GgufModel>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let config = self.config.clone();
                tokio::task::spawn_blocking(move || GgufModel::load(&config).map(Arc::new))
                    .await
                    .map_err(|e| hf_error("loader task", e))?
            })
            .await?;
        Ok(Arc::clone(model))
    }
}

#[async_trait]
impl TextGenerator for LocalGgufGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let model = self.model().await?;
        let prompt = prompt.to_string();
        let max_new_tokens = self.config.max_new_tokens;

        tokio::task::spawn_blocking(move || model.complete(&prompt, max_new_tokens))
            .await
            .map_err(|e| hf_error("generation task", e))?
    }

    fn name(&self) -> &str {
        "hf"
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create the configured generator backend
pub fn create_generator(config: &GeneratorConfig) -> Arc<dyn TextGenerator> {
    match config.backend {
        GeneratorBackend::Ollama => Arc::new(OllamaProcessGenerator::from_config(config)),
        GeneratorBackend::Hf => Arc::new(LocalGgufGenerator::new(config.clone())),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::ErrorKind;

    #[test]
    fn test_parse_response_lines() {
        let stdout = concat!(
            "{\"response\":\"Sales \"}\n",
            "not json at all\n",
            "{\"done\":false}\n",
            "{\"response\":\"grew 12%.\"}\n",
            "{\"response\":\"  \\n\"}\n",
        );
        assert_eq!(parse_response_lines(stdout), "Sales grew 12%.");
    }

    #[test]
    fn test_parse_response_lines_empty() {
        assert_eq!(parse_response_lines(""), "");
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let err: InsightError = "gpt4all".parse::<GeneratorBackend>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_factory_selects_backend() {
        let mut config = GeneratorConfig::default();
        assert_eq!(create_generator(&config).name(), "ollama");

        config.backend = GeneratorBackend::Hf;
        assert_eq!(create_generator(&config).name(), "hf");
    }

    #[test]
    fn test_hf_generator_is_lazy() {
        let generator = LocalGgufGenerator::new(GeneratorConfig::default());
        assert!(!generator.is_loaded());
    }

    #[tokio::test]
    async fn test_missing_binary_is_rag_error() {
        let generator = OllamaProcessGenerator::new("/nonexistent/ollama-binary", "mistral");
        let err = generator.generate("hello").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rag);
        assert!(err.to_string().contains("Failed to start"));
    }

    /// Scripts are written and executed from this single test so that no
    /// concurrently forked child can hold a write handle to them.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_backend_with_stub_runner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let write_script = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.display().to_string()
        };

        let ok = write_script(
            "ok.sh",
            "read -r first\n\
             printf '{\"response\":\"model=%s \"}\\n' \"$2\"\n\
             echo 'garbage'\n\
             printf '{\"response\":\"%s\"}\\n' \"$first\"",
        );
        let failing = write_script("fail.sh", "cat >/dev/null\necho 'model not found' >&2\nexit 3");
        let slow = write_script("slow.sh", "sleep 5");

        let answer = OllamaProcessGenerator::new(&ok, "mistral")
            .generate("first line\nsecond line")
            .await
            .unwrap();
        assert_eq!(answer, "model=mistral first line");

        let err = OllamaProcessGenerator::new(&failing, "mistral")
            .generate("prompt")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rag);
        assert!(err.to_string().contains("model not found"));

        let err = OllamaProcessGenerator::new(&slow, "mistral")
            .with_timeout(Duration::from_millis(200))
            .generate("prompt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
