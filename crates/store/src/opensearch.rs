//! OpenSearch-compatible document store over HTTP.
//!
//! Query DSL:
//! - lexical: `match_phrase` on the requested field
//! - knn: `knn` clause on the vector field, `k` = size
//! - filters: `term` clauses under `bool.filter`
//!
//! Transport and auth failures are surfaced as `StoreError::Unavailable` and
//! never retried here.

use async_trait::async_trait;
use chatmesh_config::StoreConfig;
use chatmesh_core::error::StoreError;
use chatmesh_core::store::{DocumentStore, QueryType, SearchFilter, SearchHit, SearchRequest, SearchTerm};
use serde_json::{Value, json};
use tracing::{debug, warn};

pub struct OpenSearchStore {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl OpenSearchStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }

    fn filter_clauses(filters: &[SearchFilter]) -> Vec<Value> {
        filters
            .iter()
            .map(|f| json!({ "term": { f.field.clone(): f.value } }))
            .collect()
    }

    /// Translate a request into the search body.
    fn build_query(request: &SearchRequest) -> Result<Value, StoreError> {
        let must = match (request.query_type, &request.term) {
            (QueryType::Lexical, SearchTerm::Text(text)) => json!({
                "match_phrase": { request.field.clone(): text }
            }),
            (QueryType::Knn, SearchTerm::Vector(vector)) => json!({
                "knn": { request.field.clone(): { "vector": vector, "k": request.size } }
            }),
            (query_type, _) => {
                return Err(StoreError::InvalidRequest(format!(
                    "{query_type:?} query with mismatched term on '{}'",
                    request.field
                )));
            }
        };

        let mut bool_query = json!({ "must": [must] });
        if !request.filters.is_empty() {
            bool_query["filter"] = Value::Array(Self::filter_clauses(&request.filters));
        }

        Ok(json!({
            "size": request.size,
            "query": { "bool": bool_query },
        }))
    }

    /// Extract hits from a `_search` response body, in service order.
    fn parse_hits(body: &Value) -> Result<Vec<SearchHit>, StoreError> {
        let hits = body
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::MalformedResponse("response without hits.hits".into()))?;

        hits.iter().map(SearchHit::from_wire).collect()
    }
}

#[async_trait]
impl DocumentStore for OpenSearchStore {
    fn name(&self) -> &str {
        "opensearch"
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>, StoreError> {
        let body = Self::build_query(&request)?;
        let url = format!("{}/{}/_search", self.base_url, request.index);

        debug!(
            index = %request.index,
            query_type = ?request.query_type,
            field = %request.field,
            size = request.size,
            "Sending search request"
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(index = %request.index, status = status.as_u16(), body = %error_body, "Search service returned error");
            return Err(StoreError::Unavailable(format!("HTTP {}: {error_body}", status.as_u16())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;

        Self::parse_hits(&body)
    }
}
