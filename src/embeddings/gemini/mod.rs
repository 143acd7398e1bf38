#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::GeminiConfig;
use crate::embeddings::{EmbeddingProvider, TaskType};
use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Blocking client for the Gemini `embedContent` REST API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    embed_url: Url,
    api_key: String,
    model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            RagError::Config(
                "Gemini API key not set (set GEMINI_API_KEY or gemini.api_key in config.toml)"
                    .to_string(),
            )
        })?;

        let embed_url = config
            .embed_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            embed_url,
            api_key,
            model: config.embedding_model.clone(),
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
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
        self.retry_attempts = attempts;
        self
    }

    /// Generate an embedding for a single text input
    #[inline]
    pub fn generate_embedding(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        debug!(
            "Generating {} embedding for text (length: {})",
            task.as_str(),
            text.len()
        );

        let request = EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
            task_type: task.as_str(),
        };

        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::EmbeddingProvider(format!("Failed to serialize request: {e}")))?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(self.embed_url.as_str())
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api_key)
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let embed_response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::EmbeddingProvider(format!("Failed to parse embedding response: {e}"))
        })?;

        let embedding = embed_response.embedding.values;
        debug!("Generated embedding with {} dimensions", embedding.len());

        Ok(embedding)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(request_error) => {
                    let should_retry = match &request_error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(RagError::EmbeddingProvider(format!(
                                    "Client error: HTTP {status}"
                                )));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                request_error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", request_error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(RagError::EmbeddingProvider(format!(
                            "Non-retryable error: {request_error}"
                        )));
                    }

                    last_error = Some(RagError::EmbeddingProvider(format!(
                        "Request error: {request_error}"
                    )));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.embed_url);

        Err(last_error.unwrap_or_else(|| {
            RagError::EmbeddingProvider("Request failed after retries".to_string())
        }))
    }
}

impl EmbeddingProvider for GeminiClient {
    #[inline]
    fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        self.generate_embedding(text, task)
    }
}
