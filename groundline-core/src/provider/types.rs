//! Common types for LLM providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when interacting with a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Provider error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Provider trait for model backends.
///
/// One implementation serves both the generation and the embedding side of
/// the pipeline, but the engine holds them as separate handles so they can
/// point at different servers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate a completion for a single prompt and return the full text.
    async fn generate(&self, request: GenerateRequest) -> Result<String>;

    /// Generate one embedding vector per input text, in input order.
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>>;

    /// List the models the backend can serve.
    async fn list_models(&self) -> Result<Vec<String>>;
}

/// Request for a single-prompt completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub context_length: usize,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: 0.2,
            context_length: 4096,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }
}

/// Request for generating embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub model: String,
    pub input: Vec<String>,
}

/// Response containing embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub embeddings: Vec<Vec<f32>>,
}
