//! Retrieval Augmented Generation (RAG) system.
//!
//! This module implements the pipeline that answers questions from a private
//! knowledge base with grounded, citation-bearing responses.
//!
//! # Architecture
//!
//! - [`RagEngine`]: Orchestrates the query path and times each stage
//! - [`curator`]: Threshold, dedup and per-document diversity cap
//! - [`prompt`]: Grounding instruction plus curated context
//! - [`embedder`]: Converts text to normalized vector embeddings
//! - [`store`]: Vector index interface, backed by Qdrant
//! - [`chunker`] / [`indexer`]: Offline ingestion of `.md`/`.txt` trees
//!
//! # How It Works
//!
//! 1. **Ingestion**:
//!    - Documents are split into passages (default: 800 chars, 120 overlap)
//!    - Each passage is embedded and upserted with `{doc_id, chunk_id, text}`
//!
//! 2. **Retrieval**:
//!    - The question is embedded
//!    - The index is over-fetched (`max(20, top_k * 5)` hits)
//!    - Hits are curated down to at most `top_k` passages
//!
//! 3. **Generation**:
//!    - With no qualifying passage the fallback answer is returned directly
//!    - Otherwise the model answers from the curated context only

pub mod chunker;
pub mod curator;
pub mod embedder;
mod engine;
pub mod indexer;
pub mod prompt;
mod qdrant_store;
pub mod store;
pub mod tokens;
mod types;

pub use curator::{curate, CurationError, CurationParams};
pub use engine::{AskRequest, GenerationSettings, RagEngine};
pub use indexer::{IngestReport, Ingestor};
pub use qdrant_store::QdrantStore;
pub use store::{CollectionStats, VectorStore};
pub use tokens::{TokenEstimator, WordCountEstimator};
pub use types::{
    AnswerMetrics, AnswerResult, AskResponse, Citation, PassageChunk, RetrievedPassage, SearchHit,
    Timings, FALLBACK_ANSWER,
};

use crate::provider::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Embedder error: {0}")]
    Embedder(#[from] embedder::EmbedderError),

    #[error("Generation failed: {0}")]
    Generation(#[from] ProviderError),

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("Indexer error: {0}")]
    Indexer(#[from] indexer::IndexerError),
}

impl From<CurationError> for RagError {
    fn from(e: CurationError) -> Self {
        RagError::InvalidRequest(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
