//! Model provider implementations for chatmesh.
//!
//! All providers implement the `chatmesh_core::Provider` trait, which covers
//! both completions and embeddings.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use chatmesh_core::error::ProviderError;
use chatmesh_core::provider::Provider;
use std::sync::Arc;

/// Build the provider described by the app configuration.
pub fn build_from_config(config: &chatmesh_config::AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured("no API key; set CHATMESH_API_KEY or api_key in config.toml".into())
    })?;
    let provider = OpenAiCompatProvider::new("openai-compat", &config.api_url, api_key)?;
    tracing::debug!(base_url = %config.api_url, "Built completion provider");
    Ok(Arc::new(provider))
}
