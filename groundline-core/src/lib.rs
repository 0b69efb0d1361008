//! groundline-core - Grounded question answering over a private knowledge base
//!
//! Provides the components of the answer pipeline:
//! - Model provider abstraction (Ollama for generation and embeddings)
//! - RAG: chunking, ingestion, retrieval curation, prompting, answering
//! - Configuration management
//! - Server API (ask operation over a Unix socket)
//!
//! ## Primary API
//!
//! Most callers go through [`RagEngine::answer`] directly or via the `Server`.

// Public modules
pub mod config;
pub mod provider;
pub mod rag;
pub mod server;

// Public exports
pub use config::{Config, ConfigError};
pub use rag::{
    AnswerMetrics, AnswerResult, AskRequest, AskResponse, Citation, CurationParams, RagEngine,
    RagError, RetrievedPassage, SearchHit, Timings, FALLBACK_ANSWER,
};
pub use server::Server;

// Provider exports
pub use provider::{GenerateRequest, OllamaProvider, Provider, ProviderError};
