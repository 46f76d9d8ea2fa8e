//! Ollama-compatible HTTP provider.
//!
//! Two layers:
//!
//! - [`OllamaApi`]: the raw model-management endpoints (`/api/tags`,
//!   `/api/pull`). It implements [`ModelRegistry`], so the [`ModelGate`]
//!   can check for and download models through it.
//! - [`OllamaClient`]: embedding (`/api/embed`) and generation
//!   (`/api/generate`). Every call first passes through
//!   [`ModelGate::ensure_available`] for the model it is about to use.
//!
//! Requests are never retried here. Errors carry the status and body the
//! provider returned.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::embedding::{prepare_text, Embedder};
use crate::error::{GateError, ProviderError};
use crate::gate::{ModelGate, ModelRegistry};
use crate::generation::{GenerationOptions, Generator};

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

/// One NDJSON line of a streaming pull.
#[derive(Debug, Default, Deserialize)]
struct PullEvent {
    #[serde(default)]
    status: String,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerationOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Model listing and download against an Ollama server.
pub struct OllamaApi {
    base_url: String,
    client: reqwest::Client,
    pull_client: reqwest::Client,
}

impl OllamaApi {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let pull_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.pull_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
            pull_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn unreachable(&self, url: &str, err: reqwest::Error) -> GateError {
        GateError::Unreachable {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl ModelRegistry for OllamaApi {
    async fn list_models(&self) -> Result<Vec<String>, GateError> {
        let url = self.endpoint("/api/tags");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.unreachable(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.unreachable(&url, e))?;
        let tags: TagsResponse = serde_json::from_slice(&body)
            .map_err(|e| GateError::MalformedResponse(format!("model list: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull_model(&self, model: &str) -> Result<(), GateError> {
        let url = self.endpoint("/api/pull");
        info!(model = %model, "downloading model");

        let mut response = self
            .pull_client
            .post(&url)
            .json(&PullRequest {
                name: model,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| self.unreachable(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut progress = PullProgress::new(model);
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.unreachable(&url, e))?
        {
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                progress.observe_line(&line)?;
            }
        }
        progress.observe_line(&buffer)?;

        info!(model = %model, "model download finished");
        Ok(())
    }
}

/// Tracks a streaming pull and decides which events are worth logging.
struct PullProgress {
    model: String,
    last_status: String,
    last_percent: Option<u64>,
}

impl PullProgress {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            last_status: String::new(),
            last_percent: None,
        }
    }

    fn observe_line(&mut self, line: &[u8]) -> Result<(), GateError> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let event: PullEvent = serde_json::from_str(line)
            .map_err(|e| GateError::MalformedResponse(format!("pull progress: {}", e)))?;
        if let Some(error) = &event.error {
            return Err(GateError::Provider(error.clone()));
        }
        if let Some(message) = self.record(&event) {
            info!(model = %self.model, "{}", message);
        }
        Ok(())
    }

    /// Returns a log line when progress moved by at least 10 points, or when
    /// the status changed on an event without byte counts.
    fn record(&mut self, event: &PullEvent) -> Option<String> {
        match (event.total, event.completed) {
            (Some(total), Some(completed)) if total > 0 => {
                let percent = completed.saturating_mul(100) / total;
                let due = match self.last_percent {
                    None => true,
                    Some(last) => percent >= last + 10 || percent < last,
                };
                self.last_status = event.status.clone();
                if due {
                    self.last_percent = Some(percent);
                    Some(format!("{}: {}%", event.status, percent.min(100)))
                } else {
                    None
                }
            }
            _ => {
                if event.status.is_empty() || event.status == self.last_status {
                    return None;
                }
                self.last_status = event.status.clone();
                self.last_percent = None;
                Some(event.status.clone())
            }
        }
    }
}

/// Embedding and generation client bound to one gate.
pub struct OllamaClient {
    api: Arc<OllamaApi>,
    gate: Arc<ModelGate>,
    embed_model: String,
    llm_model: String,
    max_embed_chars: usize,
    client: reqwest::Client,
    generate_client: reqwest::Client,
}

impl OllamaClient {
    /// Build a client with its own [`ModelGate`] over a fresh [`OllamaApi`].
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api = Arc::new(OllamaApi::new(config)?);
        let gate = Arc::new(ModelGate::new(api.clone()));
        Self::with_gate(config, api, gate)
    }

    /// Build a client that shares an existing gate.
    pub fn with_gate(
        config: &ProviderConfig,
        api: Arc<OllamaApi>,
        gate: Arc<ModelGate>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let generate_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.generate_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            api,
            gate,
            embed_model: config.embed_model.clone(),
            llm_model: config.llm_model.clone(),
            max_embed_chars: config.max_embed_chars,
            client,
            generate_client,
        })
    }

    pub fn gate(&self) -> &Arc<ModelGate> {
        &self.gate
    }

    pub fn llm_model(&self) -> &str {
        &self.llm_model
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        client: &reqwest::Client,
        path: &str,
        body: &T,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = self.api.endpoint(path);
        let response = client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| ProviderError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|source| ProviderError::Request { url, source })
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model_name(&self) -> &str {
        &self.embed_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let input = prepare_text(text, self.max_embed_chars)?;
        self.gate.ensure_available(&self.embed_model).await?;

        let body = self
            .post_json(
                &self.client,
                "/api/embed",
                &EmbedRequest {
                    model: &self.embed_model,
                    input,
                },
            )
            .await?;
        let parsed: EmbedResponse = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::MalformedResponse(format!("embedding: {}", e)))?;

        let embedding = parsed
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(ProviderError::EmptyEmbedding)?;
        debug!(model = %self.embed_model, dims = embedding.len(), "embedded text");
        Ok(embedding)
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        if prompt.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }
        self.gate.ensure_available(&self.llm_model).await?;

        let body = self
            .post_json(
                &self.generate_client,
                "/api/generate",
                &GenerateRequest {
                    model: &self.llm_model,
                    prompt,
                    stream: false,
                    options,
                },
            )
            .await?;
        let parsed: GenerateResponse = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::MalformedResponse(format!("generation: {}", e)))?;
        Ok(parsed.response)
    }
}
