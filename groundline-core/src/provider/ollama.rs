//! Ollama provider implementation.
//!
//! This module provides an Ollama HTTP API client that implements the Provider trait.

use super::types::*;
use async_trait::async_trait;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Ollama HTTP API provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Creates a provider without a request timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base_url(base_url.into()),
            http_client: reqwest::Client::new(),
        }
    }

    /// Creates a provider whose requests abort after `timeout`.
    ///
    /// This is the only timeout on the generation path; the engine itself
    /// has no cancellation points.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: trim_base_url(base_url.into()),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let ollama_request = OllamaGenerateRequest {
            model: request.model.clone(),
            prompt: request.prompt,
            options: {
                let mut opts = HashMap::new();
                opts.insert("temperature".to_string(), serde_json::json!(request.temperature));
                opts.insert("num_ctx".to_string(), serde_json::json!(request.context_length));
                opts
            },
            stream: true,
        };

        let response = self.http_client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        let mut full_response = String::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();
                if line.len() <= 1 {
                    continue;
                }
                absorb_line(&line[..line.len() - 1], &mut full_response)?;
            }
        }

        // Final line may arrive without a trailing newline
        if !buffer.is_empty() {
            absorb_line(&buffer, &mut full_response)?;
        }

        debug!(model = %request.model, chars = full_response.len(), "Generation finished");
        Ok(full_response)
    }

    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);

        let embed_request = EmbedRequest {
            model: model.to_string(),
            input: texts.to_vec(),
        };

        let response = self.http_client
            .post(&url)
            .json(&embed_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let embed_response = response.json::<EmbedResponse>().await?;
        Ok(embed_response.embeddings)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let tags = response.json::<OllamaTagsResponse>().await?;
        Ok(tags
            .models
            .into_iter()
            .filter_map(|m| m.name.or(m.model))
            .collect())
    }
}

/// Appends one NDJSON line of a streamed generation to `out`.
fn absorb_line(line: &[u8], out: &mut String) -> Result<()> {
    let line_str = String::from_utf8_lossy(line);
    let line_str = line_str.trim();
    if line_str.is_empty() {
        return Ok(());
    }

    let chunk: OllamaGenerateChunk = serde_json::from_str(line_str)?;
    if let Some(error) = chunk.error {
        return Err(ProviderError::Api(error));
    }
    out.push_str(&chunk.response);
    Ok(())
}

// Ollama-specific request/response types (internal)

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    options: HashMap<String, serde_json::Value>,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaGenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    #[allow(dead_code)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaModelTag {
    name: Option<String>,
    model: Option<String>,
}
