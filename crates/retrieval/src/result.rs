//! Retrieval results and the ordering/dedup rules shared by all retrievers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// The unit handed to the orchestration graph.
///
/// `score` is the only field compared across retrievers, so every retriever
/// runs its result set through [`normalize_scores`] before returning it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub content: String,
    pub source_path: String,
    pub score: f32,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl RetrievalResult {
    pub fn new(content: impl Into<String>, source_path: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            source_path: source_path.into(),
            score: sanitize_score(score),
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Non-finite and negative scores become 0. Larger scores are kept as-is.
pub fn sanitize_score(score: f32) -> f32 {
    if score.is_finite() { score.max(0.0) } else { 0.0 }
}

/// Bring a result set into `[0, 1]` without changing its order.
///
/// Cosine scores already fit and are left alone. Unbounded scores
/// (inner product, BM25) are divided by the set's maximum.
pub fn normalize_scores(results: &mut [RetrievalResult]) {
    let max = results.iter().map(|r| r.score).fold(0.0f32, f32::max);
    if max > 1.0 {
        for result in results.iter_mut() {
            result.score /= max;
        }
    }
}

/// Stable sort by score, highest first.
pub fn sort_by_score(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

/// Drop results whose content was already seen, keeping first occurrences
/// in their relative order.
pub fn dedup_by_content(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.content.clone()))
        .collect()
}
