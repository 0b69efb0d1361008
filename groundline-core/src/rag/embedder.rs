//! Embedding generation using model providers.
//!
//! This module converts text into unit-length vector embeddings, so cosine
//! similarity in the index reduces to a dot product.

use crate::provider::{Provider, ProviderError};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The provider API returned an error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The API response contained no embeddings.
    #[error("No embeddings returned")]
    NoEmbeddings,

    /// The provider answered with a different number of vectors than inputs.
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// A vector's length does not match the configured index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedderError>;

/// Generates normalized vector embeddings through a [`Provider`].
///
/// The dimension is fixed per deployment and must equal the vector size the
/// collection was created with; every returned vector is checked against it.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn Provider>,
    model: String,
    dimension: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embeds a batch of texts, returning one normalized vector per input.
    pub async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.provider.embed(texts, &self.model).await?;

        if embeddings.is_empty() {
            return Err(EmbedderError::NoEmbeddings);
        }
        if embeddings.len() != texts.len() {
            return Err(EmbedderError::CountMismatch {
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }

        embeddings
            .into_iter()
            .map(|vector| {
                if vector.len() != self.dimension {
                    return Err(EmbedderError::DimensionMismatch {
                        expected: self.dimension,
                        actual: vector.len(),
                    });
                }
                Ok(normalize(vector))
            })
            .collect()
    }

    /// Embeds a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbedderError::NoEmbeddings)
    }
}

/// Scales a vector to unit L2 norm; the zero vector is returned unchanged.
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    vector
}
