//! DocumentStore trait: typed façade over the search service.
//!
//! The search service is a black box exposing lexical and k-NN queries with
//! term filters. Hits keep the service's wire shape (`_score`,
//! `_source.text`/`_source.content`, `_source.metadata`) so existing
//! indices interoperate unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// The kind of query issued against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Exact phrase match on a text field
    Lexical,
    /// Approximate nearest-neighbour on a vector field
    Knn,
}

/// The term being searched for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchTerm {
    Text(String),
    Vector(Vec<f32>),
}

/// A term filter: `field` must equal `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub field: String,
    pub value: Value,
}

impl SearchFilter {
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A single search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub index: String,
    pub query_type: QueryType,
    pub term: SearchTerm,
    /// Field to match against (e.g. `metadata.chunk_id`, `vector_field`)
    pub field: String,
    pub size: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<SearchFilter>,
}

impl SearchRequest {
    /// Exact lookup of `text` on `field`.
    pub fn lexical(index: impl Into<String>, field: impl Into<String>, text: impl Into<String>, size: usize) -> Self {
        Self {
            index: index.into(),
            query_type: QueryType::Lexical,
            term: SearchTerm::Text(text.into()),
            field: field.into(),
            size,
            filters: Vec::new(),
        }
    }

    /// k-NN search of `vector` against `field`.
    pub fn knn(index: impl Into<String>, field: impl Into<String>, vector: Vec<f32>, size: usize) -> Self {
        Self {
            index: index.into(),
            query_type: QueryType::Knn,
            term: SearchTerm::Vector(vector),
            field: field.into(),
            size,
            filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<SearchFilter>) -> Self {
        self.filters = filters;
        self
    }
}

/// A search hit.
///
/// `metadata` carries the chunk id and the structural linkage
/// (`heading_hierarchy.previous` / `heading_hierarchy.next`). Linkage ids are
/// weak references, only ever used for further lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f32,
    pub source_path: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

impl SearchHit {
    /// Parse one entry of `hits.hits` from the service's response body.
    pub fn from_wire(hit: &Value) -> std::result::Result<Self, StoreError> {
        let source = hit
            .get("_source")
            .ok_or_else(|| StoreError::MalformedResponse("hit without _source".into()))?;

        let score = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
        let content = source
            .get("text")
            .or_else(|| source.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metadata = source.get("metadata").cloned().unwrap_or(Value::Null);
        let source_path = metadata
            .get("file_path")
            .or_else(|| metadata.get("source"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            score,
            source_path,
            content,
            metadata,
        })
    }

    /// Render back to the service's wire shape.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "_score": self.score,
            "_source": {
                "text": self.content,
                "metadata": self.metadata,
            }
        })
    }

    /// Look up a metadata value by dotted path (`heading_hierarchy.next`).
    pub fn meta(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.metadata, |v, key| v.get(key))
    }

    pub fn meta_str(&self, path: &str) -> Option<&str> {
        self.meta(path).and_then(Value::as_str)
    }

    pub fn chunk_id(&self) -> Option<&str> {
        self.meta_str("chunk_id")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.meta_str("content_type")
    }

    pub fn previous_chunk_id(&self) -> Option<&str> {
        self.meta_str("heading_hierarchy.previous")
    }

    pub fn next_chunk_id(&self) -> Option<&str> {
        self.meta_str("heading_hierarchy.next")
    }
}

/// The core DocumentStore trait.
///
/// Results are ordered by score descending. An empty result is an empty
/// vector. Transport and auth failures surface as
/// [`StoreError::Unavailable`] and are never retried here.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    async fn search(&self, request: SearchRequest) -> std::result::Result<Vec<SearchHit>, StoreError>;
}
