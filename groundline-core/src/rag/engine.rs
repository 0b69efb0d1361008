//! Answer orchestration.
//!
//! [`RagEngine::answer`] runs one question through the whole query path:
//! embed → search → curate → prompt → generate, timing each stage. Every
//! stage runs strictly after the previous one since each consumes the
//! previous output.

use super::curator::{curate, overfetch_limit, CurationParams};
use super::embedder::Embedder;
use super::indexer::Ingestor;
use super::prompt::build_prompt;
use super::store::{CollectionStats, VectorStore};
use super::tokens::{TokenEstimator, WordCountEstimator};
use super::types::{
    AnswerMetrics, AnswerResult, AskResponse, Citation, RetrievedPassage, SearchHit, Timings,
    FALLBACK_ANSWER,
};
use super::{QdrantStore, RagError, Result};
use crate::config::{Config, IngestConfig, LlmConfig};
use crate::provider::{GenerateRequest, OllamaProvider, Provider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One question for the knowledge base, with its retrieval knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default)]
    pub exact_search: bool,
    #[serde(default = "default_max_per_doc")]
    pub max_per_doc: usize,
}

fn default_top_k() -> usize {
    4
}

fn default_score_threshold() -> f32 {
    0.5
}

fn default_max_per_doc() -> usize {
    2
}

impl AskRequest {
    /// A request with the default knobs.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            exact_search: false,
            max_per_doc: default_max_per_doc(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_score_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    pub fn with_exact_search(mut self, exact_search: bool) -> Self {
        self.exact_search = exact_search;
        self
    }

    pub fn with_max_per_doc(mut self, max_per_doc: usize) -> Self {
        self.max_per_doc = max_per_doc;
        self
    }

    /// Checks the request and yields the curation parameters it implies.
    pub fn validate(&self) -> Result<CurationParams> {
        if self.query.trim().is_empty() {
            return Err(RagError::InvalidRequest("query must not be empty".to_string()));
        }
        Ok(CurationParams::new(self.score_threshold, self.top_k, self.max_per_doc)?)
    }
}

/// Model settings used for every generation call.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f64,
    pub context_length: usize,
}

impl From<&LlmConfig> for GenerationSettings {
    fn from(llm: &LlmConfig) -> Self {
        Self {
            model: llm.model.clone(),
            temperature: llm.temperature,
            context_length: llm.context_length,
        }
    }
}

/// The retrieval-augmented answering engine.
///
/// All collaborators are injected at construction and only read afterwards,
/// so one engine can be shared behind an `Arc` by every connection.
#[derive(Clone)]
pub struct RagEngine {
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Provider>,
    estimator: Arc<dyn TokenEstimator>,
    generation: GenerationSettings,
}

impl RagEngine {
    pub fn new(
        embedder: Embedder,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Provider>,
        generation: GenerationSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            estimator: Arc::new(WordCountEstimator),
            generation,
        }
    }

    /// Replaces the word-count token estimator.
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Builds an engine talking to Ollama and Qdrant as configured.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use groundline_core::{AskRequest, Config, RagEngine};
    /// # async fn example() {
    /// let config = Config::load_or_default();
    /// let engine = RagEngine::from_config(&config).unwrap();
    /// let response = engine.answer(&AskRequest::new("How do I reset my password?")).await;
    /// println!("{}", serde_json::to_string_pretty(&response).unwrap());
    /// # }
    /// ```
    pub fn from_config(config: &Config) -> Result<Self> {
        let embed_provider: Arc<dyn Provider> =
            Arc::new(OllamaProvider::new(&config.embedding.base_url));
        let embedder = Embedder::new(
            embed_provider,
            config.embedding.model.clone(),
            config.embedding.dimension,
        );

        let generator: Arc<dyn Provider> = Arc::new(OllamaProvider::with_timeout(
            &config.llm.base_url,
            Duration::from_secs(config.llm.timeout_secs),
        )?);

        let store: Arc<dyn VectorStore> = Arc::new(
            QdrantStore::new(&config.storage, config.embedding.dimension as u64)
                .map_err(|e| RagError::VectorIndex(format!("{e:#}")))?,
        );

        Ok(Self::new(embedder, store, generator, GenerationSettings::from(&config.llm)))
    }

    /// An ingestor sharing this engine's embedder and index.
    pub fn ingestor(&self, config: IngestConfig) -> Ingestor {
        Ingestor::new(self.embedder.clone(), Arc::clone(&self.store), config)
    }

    /// Answers a question, never failing: errors become `{ok: false, error}`.
    pub async fn answer(&self, request: &AskRequest) -> AskResponse {
        match self.try_answer(request).await {
            Ok(result) => AskResponse::success(result),
            Err(e) => {
                warn!(error = %e, "Ask failed");
                AskResponse::failure(e.to_string())
            }
        }
    }

    /// Answers a question, surfacing the first failing stage as an error.
    ///
    /// Each upstream service is called at most once; nothing is retried.
    pub async fn try_answer(&self, request: &AskRequest) -> Result<AnswerResult> {
        let params = request.validate()?;
        let started = Instant::now();

        self.store.ensure_collection().await.map_err(index_error)?;

        let retrieval_started = Instant::now();
        let query_vector = self.embedder.embed(&request.query).await?;
        let hits = self
            .store
            .search(&query_vector, overfetch_limit(params.top_k()), request.exact_search)
            .await
            .map_err(index_error)?;
        let retrieval_ms = elapsed_ms(retrieval_started);

        let curated = curate(&hits, &params);
        debug!(raw = hits.len(), curated = curated.len(), "Curated search hits");

        if curated.is_empty() {
            info!(raw = hits.len(), threshold = params.score_threshold(), "No passage qualified; returning fallback");
            return Ok(AnswerResult {
                answer: FALLBACK_ANSWER.to_string(),
                citations: Vec::new(),
                metrics: AnswerMetrics {
                    retrieval_avg_score: round_to(mean_score(&hits), 4),
                    context_tokens_est: 0,
                    prompt_tokens_est: 0,
                    timings_ms: Timings {
                        retrieval_ms: round_to(retrieval_ms, 2),
                        generation_ms: 0.0,
                        server_total_ms: round_to(elapsed_ms(started), 2),
                    },
                },
                retrieved: Vec::new(),
            });
        }

        let contexts: Vec<&str> = curated.iter().map(|h| h.text.as_str()).collect();
        let prompt = build_prompt(&contexts, &request.query);

        let generation_started = Instant::now();
        let generate_request = GenerateRequest::new(&self.generation.model, prompt.as_str())
            .with_temperature(self.generation.temperature)
            .with_context_length(self.generation.context_length);
        let raw_answer = self
            .generator
            .generate(generate_request)
            .await
            .map_err(RagError::Generation)?;
        let generation_ms = elapsed_ms(generation_started);

        let metrics = AnswerMetrics {
            retrieval_avg_score: round_to(mean_score(&curated), 4),
            context_tokens_est: contexts.iter().map(|c| self.estimator.estimate(c)).sum(),
            prompt_tokens_est: self.estimator.estimate(&prompt),
            timings_ms: Timings {
                retrieval_ms: round_to(retrieval_ms, 2),
                generation_ms: round_to(generation_ms, 2),
                server_total_ms: round_to(elapsed_ms(started), 2),
            },
        };

        info!(
            passages = curated.len(),
            retrieval_ms = metrics.timings_ms.retrieval_ms,
            generation_ms = metrics.timings_ms.generation_ms,
            "Answered query"
        );

        Ok(AnswerResult {
            answer: raw_answer.trim().to_string(),
            citations: curated.iter().map(Citation::from).collect(),
            metrics,
            retrieved: curated.iter().map(RetrievedPassage::from).collect(),
        })
    }

    /// Point count and vector configuration of the active collection.
    pub async fn stats(&self) -> Result<CollectionStats> {
        self.store.stats().await.map_err(index_error)
    }

    /// Collections visible on the vector index server.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.store.list_collections().await.map_err(index_error)
    }

    /// Models available on the generation server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.generator.list_models().await?)
    }

    /// Embeds a probe sentence and returns the vector length.
    pub async fn probe_embeddings(&self) -> Result<usize> {
        Ok(self.embedder.embed("hello world").await?.len())
    }
}

fn index_error(e: anyhow::Error) -> RagError {
    RagError::VectorIndex(format!("{e:#}"))
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

fn mean_score(hits: &[SearchHit]) -> f64 {
    if hits.is_empty() {
        return 0.0;
    }
    hits.iter().map(|h| h.score as f64).sum::<f64>() / hits.len() as f64
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::rag::types::PassageChunk;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Embeds every text to the same unit vector and records prompts.
    #[derive(Default)]
    struct FakeProvider {
        answer: String,
        fail_generation: bool,
        fail_embedding: bool,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        async fn generate(&self, request: GenerateRequest) -> crate::provider::Result<String> {
            self.prompts.lock().unwrap().push(request.prompt);
            if self.fail_generation {
                return Err(ProviderError::Api("model crashed".to_string()));
            }
            Ok(self.answer.clone())
        }

        async fn embed(&self, texts: &[String], _model: &str) -> crate::provider::Result<Vec<Vec<f32>>> {
            if self.fail_embedding {
                return Err(ProviderError::Other("embedding server down".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        async fn list_models(&self) -> crate::provider::Result<Vec<String>> {
            Ok(vec!["phi3:mini".to_string()])
        }
    }

    #[derive(Default)]
    struct FakeStore {
        hits: Vec<SearchHit>,
        fail_search: bool,
        searches: AtomicUsize,
        ensures: AtomicUsize,
        last_query: Mutex<Option<(usize, bool)>>,
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn ensure_collection(&self) -> anyhow::Result<()> {
            self.ensures.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn search(&self, _vector: &[f32], limit: usize, exact: bool) -> anyhow::Result<Vec<SearchHit>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = Some((limit, exact));
            if self.fail_search {
                anyhow::bail!("connection refused");
            }
            Ok(self.hits.clone())
        }

        async fn upsert(&self, _chunks: Vec<PassageChunk>) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stats(&self) -> anyhow::Result<CollectionStats> {
            Ok(CollectionStats {
                collection: "kb_test".to_string(),
                points: self.hits.len() as u64,
                vector_size: 2,
                distance: "Cosine".to_string(),
            })
        }

        async fn list_collections(&self) -> anyhow::Result<Vec<String>> {
            Ok(vec!["kb_test".to_string()])
        }
    }

    fn engine(provider: Arc<FakeProvider>, store: Arc<FakeStore>) -> RagEngine {
        let embedder = Embedder::new(provider.clone(), "test-embed", 2);
        RagEngine::new(
            embedder,
            store,
            provider,
            GenerationSettings {
                model: "test-llm".to_string(),
                temperature: 0.2,
                context_length: 4096,
            },
        )
    }

    fn answering(answer: &str) -> Arc<FakeProvider> {
        Arc::new(FakeProvider {
            answer: answer.to_string(),
            ..FakeProvider::default()
        })
    }

    fn with_hits(hits: Vec<SearchHit>) -> Arc<FakeStore> {
        Arc::new(FakeStore {
            hits,
            ..FakeStore::default()
        })
    }

    #[tokio::test]
    async fn test_answer_with_citations_and_metrics() {
        let provider = answering("  Invoices go out monthly [billing.md#0].\n");
        let store = with_hits(vec![
            SearchHit::new("billing.md", 0, "Invoices are sent monthly.", 0.9),
            SearchHit::new("billing.md", 1, "Late fees apply after 30 days.", 0.8),
            SearchHit::new("billing.md", 2, "Refunds take a week.", 0.7),
            SearchHit::new("intro.md", 0, "Welcome aboard.", 0.6),
        ]);

        let response = engine(provider.clone(), store).answer(&AskRequest::new("When are invoices sent?")).await;
        let result = response.result().expect("answer should succeed");

        assert_eq!(result.answer, "Invoices go out monthly [billing.md#0].");
        let cited: Vec<(&str, u64)> = result.citations.iter().map(|c| (c.doc_id.as_str(), c.chunk_id)).collect();
        assert_eq!(cited, vec![("billing.md", 0), ("billing.md", 1), ("intro.md", 0)]);
        assert_eq!(result.retrieved.len(), 3);
        assert_eq!(result.retrieved[2].text, "Welcome aboard.");

        assert_eq!(result.metrics.retrieval_avg_score, round_to((0.9f32 as f64 + 0.8f32 as f64 + 0.6f32 as f64) / 3.0, 4));
        // 4 + 6 + 2 words
        assert_eq!(result.metrics.context_tokens_est, 12);

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(result.metrics.prompt_tokens_est, WordCountEstimator.estimate(&prompts[0]));
        let first = prompts[0].find("- Invoices are sent monthly.").unwrap();
        let last = prompts[0].find("- Welcome aboard.").unwrap();
        assert!(first < last);
        assert!(prompts[0].contains("Question: When are invoices sent?"));
    }

    #[tokio::test]
    async fn test_below_threshold_returns_fallback_without_generation() {
        let provider = answering("should not be used");
        let store = with_hits(vec![
            SearchHit::new("a.md", 0, "unrelated", 0.3),
            SearchHit::new("b.md", 0, "also unrelated", 0.1),
        ]);

        let response = engine(provider.clone(), store).answer(&AskRequest::new("anything?")).await;
        let result = response.result().unwrap();

        assert_eq!(result.answer, "I don't know from the knowledge base.");
        assert!(result.is_fallback());
        assert!(result.citations.is_empty());
        assert!(result.retrieved.is_empty());
        assert_eq!(result.metrics.timings_ms.generation_ms, 0.0);
        assert_eq!(result.metrics.context_tokens_est, 0);
        assert_eq!(result.metrics.prompt_tokens_est, 0);
        assert_eq!(result.metrics.retrieval_avg_score, round_to((0.3f32 as f64 + 0.1f32 as f64) / 2.0, 4));
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_returns_fallback() {
        let provider = answering("unused");
        let store = with_hits(vec![]);

        let result = engine(provider, store).try_answer(&AskRequest::new("hello?")).await.unwrap();
        assert!(result.is_fallback());
        assert_eq!(result.metrics.retrieval_avg_score, 0.0);
    }

    #[tokio::test]
    async fn test_zero_max_per_doc_rejected_before_search() {
        let provider = answering("unused");
        let store = with_hits(vec![SearchHit::new("a.md", 0, "text", 0.9)]);

        let request = AskRequest::new("question").with_max_per_doc(0);
        let response = engine(provider.clone(), store.clone()).answer(&request).await;

        assert!(!response.is_ok());
        assert!(response.error().unwrap().contains("max_per_doc"));
        assert_eq!(store.searches.load(Ordering::SeqCst), 0);
        assert_eq!(store.ensures.load(Ordering::SeqCst), 0);
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let engine = engine(answering("unused"), with_hits(vec![]));
        let err = engine.try_answer(&AskRequest::new("   ")).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_overfetch_and_exact_flag_passed_to_index() {
        let store = with_hits(vec![]);
        let engine = engine(answering("unused"), store.clone());

        engine.answer(&AskRequest::new("q").with_top_k(2)).await;
        assert_eq!(*store.last_query.lock().unwrap(), Some((20, false)));

        engine.answer(&AskRequest::new("q").with_top_k(10).with_exact_search(true)).await;
        assert_eq!(*store.last_query.lock().unwrap(), Some((50, true)));
        assert_eq!(store.ensures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_fails_closed() {
        let provider = Arc::new(FakeProvider {
            fail_generation: true,
            ..FakeProvider::default()
        });
        let store = with_hits(vec![SearchHit::new("a.md", 0, "text", 0.9)]);

        let response = engine(provider, store).answer(&AskRequest::new("q")).await;
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["ok"], serde_json::json!(false));
        assert!(value["error"].as_str().unwrap().contains("model crashed"));
        assert!(value.get("answer").is_none());
        assert!(value.get("sources").is_none());
    }

    #[tokio::test]
    async fn test_embedding_failure_fails_closed() {
        let provider = Arc::new(FakeProvider {
            fail_embedding: true,
            ..FakeProvider::default()
        });
        let store = with_hits(vec![]);

        let err = engine(provider, store.clone()).try_answer(&AskRequest::new("q")).await.unwrap_err();
        assert!(matches!(err, RagError::Embedder(_)));
        assert_eq!(store.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_index_failure_fails_closed() {
        let store = Arc::new(FakeStore {
            fail_search: true,
            ..FakeStore::default()
        });

        let response = engine(answering("unused"), store).answer(&AskRequest::new("q")).await;
        assert!(response.error().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_custom_estimator() {
        struct CharEstimator;
        impl TokenEstimator for CharEstimator {
            fn estimate(&self, text: &str) -> usize {
                text.len()
            }
        }

        let store = with_hits(vec![SearchHit::new("a.md", 0, "abcd", 0.9)]);
        let engine = engine(answering("ok"), store).with_estimator(Arc::new(CharEstimator));
        let result = engine.try_answer(&AskRequest::new("q")).await.unwrap();
        assert_eq!(result.metrics.context_tokens_est, 4);
    }

    #[test]
    fn test_ask_request_defaults_from_json() {
        let request: AskRequest = serde_json::from_str(r#"{"query":"hi"}"#).unwrap();
        assert_eq!(request, AskRequest::new("hi"));
        assert_eq!(request.top_k, 4);
        assert_eq!(request.score_threshold, 0.5);
        assert!(!request.exact_search);
        assert_eq!(request.max_per_doc, 2);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(12.3456, 2), 12.35);
    }
}
