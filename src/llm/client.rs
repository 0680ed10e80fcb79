// src/llm/client.rs

use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Anything that turns a prompt into a raw streamed generation body.
pub trait GenerationSource {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Ollama `/api/generate` over blocking HTTP.
///
/// The body is returned untouched; the NDJSON stream is parsed by
/// [`crate::llm::stream::extract`].
#[derive(Debug, Clone)]
pub struct OllamaClient {
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.endpoint.clone(), cfg.model.clone())
            .with_timeout(Duration::from_secs(cfg.request_timeout_secs))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl GenerationSource for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        let body = json!({
            "model": self.model,
            "prompt": prompt,
        });

        info!(endpoint = %self.endpoint, model = %self.model, "requesting code pair");

        let resp = client.post(&self.endpoint).json(&body).send()?;
        let status = resp.status();
        let text = resp.text()?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "generation endpoint rejected request");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}
