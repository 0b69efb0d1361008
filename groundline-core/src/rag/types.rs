use serde::{Deserialize, Serialize};

/// The sentence returned when no retrieved passage qualifies as context.
pub const FALLBACK_ANSWER: &str = "I don't know from the knowledge base.";

/// A unit of indexed text, as written to the vector index during ingestion.
///
/// `(doc_id, chunk_id)` identifies a passage across the whole index; the
/// Qdrant point id is derived from it, so re-ingesting a document overwrites
/// its passages instead of duplicating them.
#[derive(Debug, Clone, PartialEq)]
pub struct PassageChunk {
    pub doc_id: String,
    pub chunk_id: u64,
    pub text: String,
    pub vector: Vec<f32>,
}

impl PassageChunk {
    pub fn new(
        doc_id: impl Into<String>,
        chunk_id: u64,
        text: impl Into<String>,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            chunk_id,
            text: text.into(),
            vector,
        }
    }
}

/// A candidate passage returned by the vector index for one query.
///
/// # Score Range
///
/// Scores are cosine similarities. With normalized embeddings they fall in
/// `[-1.0, 1.0]`, and in practice between `0.0` and `1.0` for text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub chunk_id: u64,
    pub text: String,
    pub score: f32,
}

impl SearchHit {
    pub fn new(doc_id: impl Into<String>, chunk_id: u64, text: impl Into<String>, score: f32) -> Self {
        Self {
            doc_id: doc_id.into(),
            chunk_id,
            text: text.into(),
            score,
        }
    }

    /// The inline citation tag the model is asked to emit for this passage.
    pub fn citation_tag(&self) -> String {
        format!("[{}#{}]", self.doc_id, self.chunk_id)
    }
}

/// A source reference in an answer, mirroring one curated passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: String,
    #[serde(rename = "chunk")]
    pub chunk_id: u64,
    pub score: f32,
}

/// A curated passage with its full text, returned for transparency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub doc_id: String,
    #[serde(rename = "chunk")]
    pub chunk_id: u64,
    pub score: f32,
    pub text: String,
}

impl From<&SearchHit> for Citation {
    fn from(hit: &SearchHit) -> Self {
        Self {
            doc_id: hit.doc_id.clone(),
            chunk_id: hit.chunk_id,
            score: hit.score,
        }
    }
}

impl From<&SearchHit> for RetrievedPassage {
    fn from(hit: &SearchHit) -> Self {
        Self {
            doc_id: hit.doc_id.clone(),
            chunk_id: hit.chunk_id,
            score: hit.score,
            text: hit.text.clone(),
        }
    }
}

/// Per-stage wall time of one answer, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub retrieval_ms: f64,
    /// Zero when no generation call was made.
    pub generation_ms: f64,
    pub server_total_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetrics {
    pub retrieval_avg_score: f64,
    pub context_tokens_est: usize,
    pub prompt_tokens_est: usize,
    pub timings_ms: Timings,
}

/// The answer to one query together with its sources and telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    #[serde(rename = "sources")]
    pub citations: Vec<Citation>,
    pub metrics: AnswerMetrics,
    pub retrieved: Vec<RetrievedPassage>,
}

impl AnswerResult {
    /// True when the fallback path was taken and no model was consulted.
    pub fn is_fallback(&self) -> bool {
        self.citations.is_empty() && self.answer == FALLBACK_ANSWER
    }
}

/// Wire shape of the ask operation's reply.
///
/// Serializes to `{"ok": true, "answer": ..., ...}` on success and to
/// `{"ok": false, "error": ...}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AskResponse {
    Answered {
        ok: bool,
        #[serde(flatten)]
        result: AnswerResult,
    },
    Failed {
        ok: bool,
        error: String,
    },
}

impl AskResponse {
    pub fn success(result: AnswerResult) -> Self {
        Self::Answered { ok: true, result }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failed {
            ok: false,
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Answered { .. })
    }

    pub fn result(&self) -> Option<&AnswerResult> {
        match self {
            Self::Answered { result, .. } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Answered { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}
