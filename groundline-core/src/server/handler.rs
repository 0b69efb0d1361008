use super::types::Request;
use crate::config::Config;
use crate::rag::RagEngine;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes requests to the engine and shapes the JSON replies.
///
/// Every reply carries an `ok` flag; failures never escape as errors, so a
/// bad request only affects its own reply.
pub struct RequestHandler {
    config: Config,
    engine: Arc<RagEngine>,
}

impl RequestHandler {
    pub fn new(config: Config, engine: Arc<RagEngine>) -> Self {
        Self { config, engine }
    }

    /// Routes request to appropriate handler based on type.
    pub async fn handle(&self, request: Request) -> Value {
        debug!(?request, "Handling request");
        match request {
            Request::Ask(payload) => self.handle_ask(payload.resolve(&self.config.retrieval)).await,
            Request::Health => json!({ "ok": true }),
            Request::Config => self.handle_config(),
            Request::Stats => self.handle_stats().await,
            Request::PingIndex => self.handle_ping_index().await,
            Request::PingLlm => self.handle_ping_llm().await,
            Request::PingEmbeddings => self.handle_ping_embeddings().await,
        }
    }

    async fn handle_ask(&self, request: crate::rag::AskRequest) -> Value {
        let response = self.engine.answer(&request).await;
        serde_json::to_value(&response).unwrap_or_else(error_reply)
    }

    fn handle_config(&self) -> Value {
        json!({
            "ok": true,
            "qdrant": self.config.storage.url,
            "collection": self.config.storage.collection_name,
            "ollama_model": self.config.llm.model,
            "ollama_url": self.config.llm.base_url,
            "emb_model": self.config.embedding.model,
            "emb_dim": self.config.embedding.dimension,
        })
    }

    async fn handle_stats(&self) -> Value {
        match self.engine.stats().await {
            Ok(stats) => json!({
                "ok": true,
                "collection": stats.collection,
                "points": stats.points,
                "vector_size": stats.vector_size,
                "distance": stats.distance,
            }),
            Err(e) => error_reply(e),
        }
    }

    async fn handle_ping_index(&self) -> Value {
        match self.engine.list_collections().await {
            Ok(collections) => json!({ "ok": true, "collections": collections }),
            Err(e) => error_reply(e),
        }
    }

    async fn handle_ping_llm(&self) -> Value {
        match self.engine.list_models().await {
            Ok(models) => json!({ "ok": true, "models": models }),
            Err(e) => error_reply(e),
        }
    }

    async fn handle_ping_embeddings(&self) -> Value {
        match self.engine.probe_embeddings().await {
            Ok(dim) => json!({ "ok": true, "dim": dim }),
            Err(e) => error_reply(e),
        }
    }
}

pub(crate) fn error_reply(error: impl std::fmt::Display) -> Value {
    warn!(%error, "Request failed");
    json!({ "ok": false, "error": error.to_string() })
}
