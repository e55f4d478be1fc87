//! Ollama HTTP client with retry logic

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delay before retry number `attempt + 1`, doubling up to a ceiling
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(factor)).min(MAX_BACKOFF)
}

/// Server-side and throttling statuses may succeed on a later attempt
fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// A failed attempt, tagged with whether another try could help
struct Failure {
    error: Error,
    transient: bool,
}

impl Failure {
    fn transient(error: Error) -> Self {
        Self {
            error,
            transient: true,
        }
    }

    fn permanent(error: Error) -> Self {
        Self {
            error,
            transient: false,
        }
    }

    fn from_status(status: StatusCode, error: Error) -> Self {
        if is_transient(status) {
            Self::transient(error)
        } else {
            Self::permanent(error)
        }
    }
}

/// Ollama API client with automatic retry
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    /// Retry transport errors and transient statuses with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, Failure>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(failure) if failure.transient && attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}, retrying in {:?}",
                        attempt + 1,
                        self.max_retries + 1,
                        failure.error,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    /// Check if Ollama is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Embed one text with the given model
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let url = url.as_str();

        self.retry_request(|| async move {
            let response = self
                .client
                .post(url)
                .json(&EmbedRequest { model, prompt: text })
                .send()
                .await
                .map_err(|e| Failure::transient(Error::embedding(format!("request failed: {}", e))))?;

            let status = response.status();
            if !status.is_success() {
                return Err(Failure::from_status(status, Error::embedding(format!("HTTP {}", status))));
            }

            let body: EmbedResponse = response.json().await.map_err(|e| {
                Failure::permanent(Error::embedding(format!("failed to parse response: {}", e)))
            })?;
            Ok(body.embedding)
        })
        .await
    }

    /// Non-streaming completion
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let url = url.as_str();
        tracing::info!("Generating answer with model: {}", model);

        self.retry_request(|| async move {
            let request = GenerateRequest {
                model,
                prompt,
                stream: false,
                options,
            };
            let response = self
                .client
                .post(url)
                .json(&request)
                .send()
                .await
                .map_err(|e| Failure::transient(Error::generation(format!("request failed: {}", e))))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Failure::from_status(
                    status,
                    Error::generation(format!("HTTP {} - {}", status, body)),
                ));
            }

            let body: GenerateResponse = response.json().await.map_err(|e| {
                Failure::permanent(Error::generation(format!("failed to parse response: {}", e)))
            })?;
            Ok(body.response)
        })
        .await
    }
}
