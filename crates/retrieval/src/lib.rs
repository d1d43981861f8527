//! # chatmesh-retrieval
//!
//! Retrievers over the document store:
//! - [`QuestionRetriever`] matches the user query against curated FAQ questions
//! - [`DocumentRetriever`] finds document chunks and widens them into context
//! - [`IntentionRetriever`] returns few-shot examples mapping queries to tools
//!
//! Every retriever produces [`RetrievalResult`]s with scores in `[0, 1]`,
//! sorted best first. [`merge_retrieve`] fans out over several retrievers.

pub mod chunk;
pub mod context;
pub mod document;
pub mod embedding;
pub mod intention;
pub mod merge;
pub mod question;
pub mod result;

pub use chunk::ChunkId;
pub use context::{ContextAssembler, ContextMode, ContextWindow};
pub use document::DocumentRetriever;
pub use embedding::{EmbeddingPurpose, embed_query};
pub use intention::{IntentionExample, IntentionRetriever};
pub use merge::merge_retrieve;
pub use question::QuestionRetriever;
pub use result::{RetrievalResult, dedup_by_content, normalize_scores, sanitize_score, sort_by_score};

use async_trait::async_trait;
use chatmesh_core::error::RetrievalError;
use chatmesh_core::{DocumentStore, Provider, TimeoutConfig};
use std::sync::Arc;

/// Anything that turns a query into scored results.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Index or logical name, used in logs and trace output.
    fn name(&self) -> &str;

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>, RetrievalError>;
}

/// The shared services a retriever talks to.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn DocumentStore>,
    pub embedder: Arc<dyn Provider>,
    /// Used when an index does not name its own embedding model
    pub embedding_model: String,
    pub timeouts: TimeoutConfig,
}

impl Backends {
    pub fn new(store: Arc<dyn DocumentStore>, embedder: Arc<dyn Provider>, embedding_model: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            embedding_model: embedding_model.into(),
            timeouts: TimeoutConfig::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("store", &self.store.name())
            .field("embedder", &self.embedder.name())
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}
