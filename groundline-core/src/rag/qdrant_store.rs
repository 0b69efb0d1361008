//! Qdrant vector database storage implementation.
//!
//! Passages are stored as points with a `{doc_id, chunk_id, text}` payload.
//! Point ids are derived from `(doc_id, chunk_id)`, so upserting a passage
//! that already exists replaces it.

use super::store::{CollectionStats, VectorStore};
use super::types::{PassageChunk, SearchHit};
use crate::config::StorageConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use qdrant_client::{
    Payload, Qdrant,
    qdrant::{
        vectors_config::Config, CountPointsBuilder, CreateCollectionBuilder, Distance,
        PointStruct, ScoredPoint, SearchParamsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
        VectorParamsBuilder, VectorsConfig,
    },
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Qdrant-backed vector index for passage embeddings.
#[derive(Clone)]
pub struct QdrantStore {
    client: Arc<Qdrant>,
    collection_name: String,
    vector_size: u64,
    ensured: Arc<OnceCell<()>>,
}

#[async_trait]
impl VectorStore for QdrantStore {
    /// Runs the create-if-absent check once per store; later calls return
    /// immediately. A failed check is retried on the next call.
    async fn ensure_collection(&self) -> Result<()> {
        self.ensured
            .get_or_try_init(|| self.create_if_absent())
            .await
            .map(|_| ())
    }

    async fn search(&self, vector: &[f32], limit: usize, exact: bool) -> Result<Vec<SearchHit>> {
        let mut builder = SearchPointsBuilder::new(&self.collection_name, vector.to_vec(), limit as u64)
            .with_payload(true);
        if exact {
            builder = builder.params(SearchParamsBuilder::default().exact(true));
        }

        let search_result = self
            .client
            .search_points(builder)
            .await
            .context("Failed to search points")?;

        search_result
            .result
            .into_iter()
            .map(hit_from_point)
            .collect()
    }

    async fn upsert(&self, chunks: Vec<PassageChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let count = chunks.len();
        let points = chunks
            .into_iter()
            .map(|chunk| {
                let payload = Payload::try_from(json!({
                    "doc_id": chunk.doc_id,
                    "chunk_id": chunk.chunk_id,
                    "text": chunk.text,
                }))
                .context("Failed to build point payload")?;
                Ok(PointStruct::new(
                    point_id(&chunk.doc_id, chunk.chunk_id),
                    chunk.vector,
                    payload,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points).wait(true))
            .await
            .context("Failed to upsert points")?;

        debug!(collection = %self.collection_name, count, "Upserted points");
        Ok(())
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let info = self
            .client
            .collection_info(&self.collection_name)
            .await
            .context("Failed to get collection info")?;

        let count = self
            .client
            .count(CountPointsBuilder::new(&self.collection_name).exact(true))
            .await
            .context("Failed to count points")?;

        let params = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        let (vector_size, distance) = match params {
            Some(Config::Params(p)) => (
                p.size,
                Distance::try_from(p.distance)
                    .map(|d| d.as_str_name().to_string())
                    .unwrap_or_else(|_| "Unknown".to_string()),
            ),
            _ => (0, "Unknown".to_string()),
        };

        Ok(CollectionStats {
            collection: self.collection_name.clone(),
            points: count.result.map(|r| r.count).unwrap_or(0),
            vector_size,
            distance,
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .list_collections()
            .await
            .context("Failed to list collections")?;

        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }
}

impl QdrantStore {
    /// Connects to the Qdrant server named in the storage config.
    ///
    /// Connecting does not touch the collection; that happens lazily on the
    /// first [`ensure_collection`](VectorStore::ensure_collection).
    pub fn new(storage_config: &StorageConfig, vector_size: u64) -> Result<Self> {
        let client = Qdrant::from_url(&storage_config.url)
            .build()
            .context("Failed to connect to Qdrant server")?;

        Ok(Self {
            client: Arc::new(client),
            collection_name: storage_config.collection_name.clone(),
            vector_size,
            ensured: Arc::new(OnceCell::new()),
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn create_if_absent(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .context("Failed to check collection")?;

        if !exists {
            info!(collection = %self.collection_name, dim = self.vector_size, "Creating collection");
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name)
                        .vectors_config(VectorsConfig {
                            config: Some(Config::Params(
                                VectorParamsBuilder::new(self.vector_size, Distance::Cosine).build()
                            )),
                        })
                )
                .await
                .context("Failed to create collection")?;
        }

        Ok(())
    }
}

/// Stable numeric point id for a passage.
pub(crate) fn point_id(doc_id: &str, chunk_id: u64) -> u64 {
    let digest = Sha256::digest(format!("{doc_id}#{chunk_id}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn hit_from_point(point: ScoredPoint) -> Result<SearchHit> {
    let payload = point.payload;

    let doc_id = payload
        .get("doc_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("Point payload is missing doc_id"))?;

    let chunk_id = payload
        .get("chunk_id")
        .and_then(|v| v.as_integer())
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| anyhow!("Point payload for {doc_id} has no valid chunk_id"))?;

    let text = payload
        .get("text")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("Point payload for {doc_id}#{chunk_id} is missing text"))?;

    Ok(SearchHit {
        doc_id,
        chunk_id,
        text,
        score: point.score,
    })
}
