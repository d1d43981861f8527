//! Query embedding.
//!
//! Asymmetric embedding models expect a language-specific instruction in
//! front of a *search* query; symmetric ones (`m3`) and similarity lookups
//! take the text verbatim.

use chatmesh_config::{IndexConfig, Lang};
use chatmesh_core::error::{ProviderError, RetrievalError};
use chatmesh_core::provider::EmbeddingRequest;
use chatmesh_core::timeout::embed_with_timeout;
use tracing::debug;

use crate::Backends;

const ZH_RELEVANCE_PROMPT: &str = "为这个句子生成表示以用于检索相关文章：";
const EN_RELEVANCE_PROMPT: &str = "Represent this sentence for searching relevant passages: ";

/// What the query vector will be compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingPurpose {
    /// Question-to-question similarity
    Similarity,
    /// Query-to-passage relevance
    Relevance,
}

/// The text actually sent to the embedding model.
pub fn query_text(query: &str, index: &IndexConfig, purpose: EmbeddingPurpose) -> String {
    match purpose {
        EmbeddingPurpose::Similarity => query.to_string(),
        EmbeddingPurpose::Relevance if index.model_type == "m3" => query.to_string(),
        EmbeddingPurpose::Relevance => match index.lang {
            Lang::Zh => format!("{ZH_RELEVANCE_PROMPT}{query}"),
            Lang::En => format!("{EN_RELEVANCE_PROMPT}{query}"),
        },
    }
}

/// Embed one query for `index`.
pub async fn embed_query(
    backends: &Backends,
    index: &IndexConfig,
    query: &str,
    purpose: EmbeddingPurpose,
) -> Result<Vec<f32>, RetrievalError> {
    let model = if index.embedding_model_id.is_empty() {
        backends.embedding_model.clone()
    } else {
        index.embedding_model_id.clone()
    };

    debug!(index = %index.index_name, model = %model, ?purpose, "Embedding query");

    let request = EmbeddingRequest {
        model,
        inputs: vec![query_text(query, index, purpose)],
    };
    let response = embed_with_timeout(backends.embedder.as_ref(), request, backends.timeouts.embedding()).await?;

    response
        .embeddings
        .into_iter()
        .next()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "embedding response contained no vector".into(),
        })
        .map_err(RetrievalError::Embedding)
}
