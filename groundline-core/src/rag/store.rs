//! Vector index abstraction.
//!
//! The engine and the ingestor only talk to the index through this trait;
//! [`QdrantStore`](super::qdrant_store::QdrantStore) is the production
//! implementation.

use super::types::{PassageChunk, SearchHit};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Shape and size of the active collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub collection: String,
    pub points: u64,
    pub vector_size: u64,
    pub distance: String,
}

/// Unified interface for vector index operations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection with the configured dimension and cosine
    /// distance if it does not exist yet. Safe to call repeatedly.
    async fn ensure_collection(&self) -> Result<()>;

    /// Nearest-neighbor search by cosine similarity.
    ///
    /// # Arguments
    ///
    /// * `vector` - The normalized query embedding
    /// * `limit` - Maximum number of hits to return
    /// * `exact` - Exhaustive scan instead of the approximate index
    ///
    /// Implementations should return hits by descending score, but callers
    /// must not rely on it.
    async fn search(&self, vector: &[f32], limit: usize, exact: bool) -> Result<Vec<SearchHit>>;

    /// Adds or replaces passages, keyed by `(doc_id, chunk_id)`.
    async fn upsert(&self, chunks: Vec<PassageChunk>) -> Result<()>;

    /// Exact point count and vector configuration of the collection.
    async fn stats(&self) -> Result<CollectionStats>;

    /// Names of all collections on the server.
    async fn list_collections(&self) -> Result<Vec<String>>;
}
