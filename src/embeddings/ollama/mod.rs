#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{ChatCompletion, Embedder};
use crate::QaError;
use crate::config::OllamaConfig;
use crate::session::ChatMessage;

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            batch_size: config.batch_size,
            agent,
            retry_attempts: config.retry_attempts,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Test connection to Ollama server and verify the given models are available
    #[inline]
    pub fn health_check(&self, models: &[&str]) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping().context("Server ping failed")?;

        for model in models {
            self.validate_model(model)
                .with_context(|| format!("Model validation failed for {}", model))?;
        }

        info!("Health check passed for Ollama server at {}", self.base_url);
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        self.get_json::<ModelsResponse>("/api/tags")
            .context("Failed to ping Ollama server")?;
        debug!("Server ping successful");
        Ok(())
    }

    /// Validate that a model is available, accepting names without the `:latest` tag
    #[inline]
    pub fn validate_model(&self, model: &str) -> Result<()> {
        let models = self.list_models().context("Failed to list models")?;
        let tagged = format!("{}:latest", model);

        if models.iter().any(|m| m.name == model || m.name == tagged) {
            debug!("Model {} is available", model);
            return Ok(());
        }

        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        warn!("Model {} not found among {:?}", model, available);
        Err(anyhow::anyhow!(
            "Model '{}' is not available. Available models: {:?}",
            model,
            available
        ))
    }

    /// Models installed on the server
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response: ModelsResponse = self
            .get_json("/api/tags")
            .context("Failed to fetch models")?;
        debug!("Found {} models", response.models.len());
        Ok(response.models)
    }

    /// Embed texts in order, `batch_size` texts per request
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1) as usize) {
            let response: EmbedResponse = self
                .post_json(
                    "/api/embed",
                    &EmbedRequest {
                        model: &self.embedding_model,
                        input: batch,
                    },
                )
                .with_context(|| format!("Failed to embed batch of {} texts", batch.len()))?;

            if response.embeddings.len() != batch.len() {
                return Err(anyhow::anyhow!(
                    "Mismatch between request and response counts: {} vs {}",
                    batch.len(),
                    response.embeddings.len()
                ));
            }
            results.extend(response.embeddings);
        }

        debug!("Generated {} embeddings", results.len());
        Ok(results)
    }

    /// Non-streaming chat completion
    #[inline]
    pub fn generate_chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        debug!(
            "Requesting chat completion from {} with {} messages",
            model,
            messages.len()
        );

        let response: ChatResponse = self
            .post_json(
                "/api/chat",
                &ChatRequest {
                    model,
                    messages,
                    stream: false,
                },
            )
            .context("Failed to generate chat completion")?;

        Ok(response.message.content)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let body = self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;
        serde_json::from_str(&body).with_context(|| format!("Failed to parse response from {}", path))
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint(path)?;
        let request_json = serde_json::to_string(body)
            .with_context(|| format!("Failed to serialize request for {}", path))?;

        let response = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;
        serde_json::from_str(&response)
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    // Wait before retry (exponential backoff)
                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts)
            .map_err(|e| QaError::Embedding(format!("{:#}", e)))
    }
}

impl ChatCompletion for OllamaClient {
    #[inline]
    fn chat(&self, model: &str, messages: &[ChatMessage]) -> crate::Result<String> {
        self.generate_chat(model, messages)
            .map_err(|e| QaError::Completion(format!("{:#}", e)))
    }
}
