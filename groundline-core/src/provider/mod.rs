//! Model provider abstraction layer.
//!
//! This module defines a common interface for model backends used for
//! answer generation and text embeddings.

mod types;
pub mod ollama;

// Re-export common types
pub use types::{
    Provider,
    ProviderError,
    Result,
    GenerateRequest,
    EmbedRequest,
    EmbedResponse,
};

// Re-export provider implementations
pub use ollama::OllamaProvider;
