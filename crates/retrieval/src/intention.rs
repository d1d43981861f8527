//! Intention retriever: labelled example queries mapping to tool calls.

use async_trait::async_trait;
use chatmesh_config::IntentionRetrieverConfig;
use chatmesh_core::error::RetrievalError;
use chatmesh_core::store::{SearchHit, SearchRequest};
use chatmesh_core::timeout::search_with_timeout;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::embedding::{EmbeddingPurpose, embed_query};
use crate::result::{RetrievalResult, normalize_scores, sort_by_score};
use crate::{Backends, Retriever};

/// A few-shot example: "a query like this calls `intent` with `kwargs`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentionExample {
    pub query: String,
    pub intent: String,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    pub score: f32,
}

impl IntentionExample {
    /// Read back an example produced by [`IntentionRetriever`].
    pub fn from_result(result: &RetrievalResult) -> Option<Self> {
        let intent = result.extra_str("intent")?.to_string();
        let kwargs = result
            .extra
            .get("kwargs")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Some(Self {
            query: result.content.clone(),
            intent,
            kwargs,
            score: result.score,
        })
    }

    /// Examples scoring at least `threshold`, in input order.
    pub fn above(results: &[RetrievalResult], threshold: f32) -> Vec<Self> {
        results
            .iter()
            .filter(|r| r.score >= threshold)
            .filter_map(Self::from_result)
            .collect()
    }
}

pub struct IntentionRetriever {
    config: IntentionRetrieverConfig,
    backends: Backends,
}

impl IntentionRetriever {
    pub fn new(config: IntentionRetrieverConfig, backends: Backends) -> Self {
        Self { config, backends }
    }

    fn label(hit: &SearchHit) -> Option<(String, Value)> {
        let intent = hit.meta_str("intent").or_else(|| hit.meta_str("answer.intent"))?;
        let kwargs = hit
            .meta("kwargs")
            .or_else(|| hit.meta("answer.kwargs"))
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Some((intent.to_string(), kwargs))
    }
}

#[async_trait]
impl Retriever for IntentionRetriever {
    fn name(&self) -> &str {
        &self.config.index.index_name
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let index = &self.config.index;
        let vector = embed_query(&self.backends, index, query, EmbeddingPurpose::Similarity).await?;
        let request = SearchRequest::knn(&index.index_name, &index.vector_field, vector, self.config.top_k);
        let hits = search_with_timeout(self.backends.store.as_ref(), request, self.backends.timeouts.store()).await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some((intent, kwargs)) = Self::label(&hit) else {
                warn!(index = %index.index_name, content = %hit.content, "Intention example without intent, skipping");
                continue;
            };
            results.push(
                RetrievalResult::new(hit.content, hit.source_path, hit.score)
                    .with_extra("intent", intent)
                    .with_extra("kwargs", kwargs),
            );
        }
        normalize_scores(&mut results);
        sort_by_score(&mut results);

        debug!(index = %index.index_name, results = results.len(), "Intention retrieval done");
        Ok(results)
    }
}
