//! Per-call timeouts and turn cancellation.
//!
//! Every external call (store search, embedding, completion, tool) runs
//! under `tokio::time::timeout`. A timed-out call is a failure of that call;
//! callers decide whether it becomes a turn failure.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

use crate::error::{ProviderError, StoreError};
use crate::provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse};
use crate::store::{DocumentStore, SearchHit, SearchRequest};

/// Timeouts per kind of external call, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub store_ms: u64,
    pub embedding_ms: u64,
    pub completion_ms: u64,
    pub tool_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            store_ms: 10_000,
            embedding_ms: 15_000,
            completion_ms: 120_000,
            tool_ms: 60_000,
        }
    }
}

impl TimeoutConfig {
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn embedding(&self) -> Duration {
        Duration::from_millis(self.embedding_ms)
    }

    pub fn completion(&self) -> Duration {
        Duration::from_millis(self.completion_ms)
    }

    pub fn tool(&self) -> Duration {
        Duration::from_millis(self.tool_ms)
    }
}

/// `store.search` bounded by `limit`.
pub async fn search_with_timeout(
    store: &dyn DocumentStore,
    request: SearchRequest,
    limit: Duration,
) -> std::result::Result<Vec<SearchHit>, StoreError> {
    let index = request.index.clone();
    match tokio::time::timeout(limit, store.search(request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(store = store.name(), index = %index, timeout_ms = limit.as_millis() as u64, "Store search timed out");
            Err(StoreError::Timeout {
                index,
                timeout_ms: limit.as_millis() as u64,
            })
        }
    }
}

/// `provider.complete` bounded by `limit`.
pub async fn complete_with_timeout(
    provider: &dyn Provider,
    request: ProviderRequest,
    limit: Duration,
) -> std::result::Result<ProviderResponse, ProviderError> {
    match tokio::time::timeout(limit, provider.complete(request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(provider = provider.name(), timeout_ms = limit.as_millis() as u64, "Completion timed out");
            Err(ProviderError::Timeout(format!(
                "Provider '{}' completion timed out after {}ms",
                provider.name(),
                limit.as_millis()
            )))
        }
    }
}

/// `provider.embed` bounded by `limit`.
pub async fn embed_with_timeout(
    provider: &dyn Provider,
    request: EmbeddingRequest,
    limit: Duration,
) -> std::result::Result<EmbeddingResponse, ProviderError> {
    match tokio::time::timeout(limit, provider.embed(request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(provider = provider.name(), timeout_ms = limit.as_millis() as u64, "Embedding timed out");
            Err(ProviderError::Timeout(format!(
                "Provider '{}' embedding timed out after {}ms",
                provider.name(),
                limit.as_millis()
            )))
        }
    }
}

/// Cancels a running turn from outside (e.g. client disconnect).
///
/// The runner checks the paired [`CancelToken`] before every node
/// transition; in-flight calls are left to finish.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

/// The turn's view of a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelToken) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, CancelToken { receiver })
    }

    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_, token) = CancelHandle::new();
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }
}
