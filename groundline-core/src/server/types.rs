use crate::config::RetrievalConfig;
use crate::rag::AskRequest;
use serde::{Deserialize, Serialize};

/// Request from client to server, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ask(AskPayload),
    Health,
    Config,
    Stats,
    PingIndex,
    PingLlm,
    PingEmbeddings,
}

/// Wire form of an ask request; omitted knobs take the configured defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskPayload {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_search: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_doc: Option<usize>,
}

impl AskPayload {
    pub fn resolve(self, defaults: &RetrievalConfig) -> AskRequest {
        AskRequest {
            query: self.query,
            top_k: self.top_k.unwrap_or(defaults.top_k),
            score_threshold: self.score_threshold.unwrap_or(defaults.score_threshold),
            exact_search: self.exact_search.unwrap_or(defaults.exact_search),
            max_per_doc: self.max_per_doc.unwrap_or(defaults.max_per_doc),
        }
    }
}
