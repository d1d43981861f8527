//! In-memory document store: useful for testing and local runs.
//!
//! Lexical queries on `metadata.*` fields are exact matches (the way chunk
//! ids and source paths are looked up); on any other field they are
//! case-insensitive substring matches. k-NN ranks by cosine similarity.

use async_trait::async_trait;
use chatmesh_core::error::StoreError;
use chatmesh_core::store::{DocumentStore, QueryType, SearchFilter, SearchHit, SearchRequest, SearchTerm};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::vector::rank_by_similarity;

/// A document as indexed: text, metadata and named vector fields.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub text: String,
    pub metadata: Value,
    pub vectors: HashMap<String, Vec<f32>>,
}

impl StoredDocument {
    pub fn new(text: impl Into<String>, metadata: Value) -> Self {
        Self {
            text: text.into(),
            metadata,
            vectors: HashMap::new(),
        }
    }

    pub fn with_vector(mut self, field: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(field.into(), vector);
        self
    }

    fn field(&self, path: &str) -> Option<&Value> {
        match path.strip_prefix("metadata.") {
            Some(rest) => rest.split('.').try_fold(&self.metadata, |v, key| v.get(key)),
            None => None,
        }
    }

    fn matches_filter(&self, filter: &SearchFilter) -> bool {
        self.field(&filter.field) == Some(&filter.value)
    }

    fn matches_text(&self, field: &str, text: &str) -> bool {
        if field.starts_with("metadata.") {
            return match self.field(field) {
                Some(Value::String(s)) => s == text,
                Some(other) => other.to_string() == text,
                None => false,
            };
        }
        self.text.to_lowercase().contains(&text.to_lowercase())
    }

    fn to_hit(&self, score: f32) -> Result<SearchHit, StoreError> {
        SearchHit::from_wire(&serde_json::json!({
            "_score": score,
            "_source": {
                "text": self.text,
                "metadata": self.metadata,
            }
        }))
    }
}

/// An in-memory store holding documents per index.
#[derive(Default)]
pub struct InMemoryStore {
    indices: RwLock<HashMap<String, Vec<StoredDocument>>>,
    searches: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a document.
    pub async fn add(&self, index: &str, document: StoredDocument) {
        self.indices
            .write()
            .await
            .entry(index.to_string())
            .or_default()
            .push(document);
    }

    /// Number of documents in an index.
    pub async fn document_count(&self, index: &str) -> usize {
        self.indices.read().await.get(index).map_or(0, Vec::len)
    }

    /// Number of search calls served so far.
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>, StoreError> {
        self.searches.fetch_add(1, Ordering::Relaxed);

        let indices = self.indices.read().await;
        let Some(docs) = indices.get(&request.index) else {
            return Ok(Vec::new());
        };

        let candidates: Vec<&StoredDocument> = docs
            .iter()
            .filter(|d| request.filters.iter().all(|f| d.matches_filter(f)))
            .collect();

        match (request.query_type, &request.term) {
            (QueryType::Lexical, SearchTerm::Text(text)) => candidates
                .into_iter()
                .filter(|d| d.matches_text(&request.field, text))
                .take(request.size)
                .map(|d| d.to_hit(1.0))
                .collect(),
            (QueryType::Knn, SearchTerm::Vector(query)) => {
                let ranked = rank_by_similarity(
                    candidates.iter().map(|d| d.vectors.get(&request.field).map(Vec::as_slice)),
                    query,
                    request.size,
                );
                ranked
                    .into_iter()
                    .map(|(i, score)| candidates[i].to_hit(score))
                    .collect()
            }
            (query_type, _) => Err(StoreError::InvalidRequest(format!(
                "{query_type:?} query with mismatched term on '{}'",
                request.field
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .add(
                "docs",
                StoredDocument::new("Refunds take 5 days.", json!({"file_path": "refund.md", "chunk_id": "$1-1", "is_api": false}))
                    .with_vector("vector_field", vec![1.0, 0.0]),
            )
            .await;
        store
            .add(
                "docs",
                StoredDocument::new("GET /orders lists orders.", json!({"file_path": "api.md", "chunk_id": "$2-1", "is_api": true}))
                    .with_vector("vector_field", vec![0.0, 1.0]),
            )
            .await;
        store
    }

    #[tokio::test]
    async fn lexical_metadata_lookup_is_exact() {
        let store = seeded().await;
        let hits = store
            .search(SearchRequest::lexical("docs", "metadata.chunk_id", "$1-1", 1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_path, "refund.md");

        let none = store
            .search(SearchRequest::lexical("docs", "metadata.chunk_id", "$1", 1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn lexical_text_is_substring() {
        let store = seeded().await;
        let hits = store
            .search(SearchRequest::lexical("docs", "text", "refunds", 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn knn_orders_by_cosine_and_applies_filters() {
        let store = seeded().await;
        let hits = store
            .search(SearchRequest::knn("docs", "vector_field", vec![0.9, 0.1], 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].chunk_id(), Some("$1-1"));

        let filtered = store
            .search(
                SearchRequest::knn("docs", "vector_field", vec![0.9, 0.1], 10)
                    .with_filters(vec![SearchFilter::term("metadata.is_api", true)]),
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].source_path, "api.md");
    }

    #[tokio::test]
    async fn unknown_index_is_empty_not_error() {
        let store = InMemoryStore::new();
        let hits = store
            .search(SearchRequest::lexical("nope", "metadata.chunk_id", "x", 1))
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(store.search_count(), 1);
    }

    #[tokio::test]
    async fn mismatched_term_is_invalid_request() {
        let store = seeded().await;
        let mut request = SearchRequest::knn("docs", "vector_field", vec![1.0, 0.0], 1);
        request.term = SearchTerm::Text("oops".into());
        let err = store.search(request).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }
}
