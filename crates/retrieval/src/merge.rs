use chatmesh_core::error::RetrievalError;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

use crate::Retriever;
use crate::result::{RetrievalResult, sort_by_score};

/// Run every retriever concurrently and merge their results by score.
///
/// Ties keep retriever order. The first failure aborts the merge.
pub async fn merge_retrieve(retrievers: &[Arc<dyn Retriever>], query: &str) -> Result<Vec<RetrievalResult>, RetrievalError> {
    let batches = try_join_all(retrievers.iter().map(|r| r.retrieve(query))).await?;

    let mut merged: Vec<RetrievalResult> = batches.into_iter().flatten().collect();
    sort_by_score(&mut merged);

    debug!(retrievers = retrievers.len(), results = merged.len(), "Merged retrieval results");
    Ok(merged)
}
