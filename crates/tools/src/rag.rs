//! RAG tool: answers a query from one or more document retrievers.
//!
//! Output is the retrieved contexts. The artifact is either the same
//! contexts or, when a generation model is attached, a completion grounded
//! in them. Source paths travel with the artifact.

use async_trait::async_trait;
use chatmesh_config::prompts::render;
use chatmesh_config::{ModelConfig, ModelKwargs};
use chatmesh_core::error::ToolError;
use chatmesh_core::message::Message;
use chatmesh_core::provider::{Provider, ProviderRequest};
use chatmesh_core::timeout::complete_with_timeout;
use chatmesh_core::tool::{Tool, ToolResult};
use chatmesh_retrieval::{RetrievalResult, Retriever, merge_retrieve};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Separator between retrieved contexts.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// A completion model that turns contexts into an answer.
#[derive(Clone)]
pub struct RagGeneration {
    pub provider: Arc<dyn Provider>,
    pub model: ModelConfig,
    pub kwargs: ModelKwargs,
    /// Template with a `{context}` placeholder
    pub system_prompt: String,
    pub timeout: Duration,
}

pub struct RagTool {
    name: String,
    description: String,
    retrievers: Vec<Arc<dyn Retriever>>,
    generation: Option<RagGeneration>,
}

impl RagTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, retrievers: Vec<Arc<dyn Retriever>>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            retrievers,
            generation: None,
        }
    }

    pub fn with_generation(mut self, generation: RagGeneration) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Retrieved contexts for `query`, best first.
    pub async fn contexts(&self, query: &str) -> Result<Vec<RetrievalResult>, ToolError> {
        merge_retrieve(&self.retrievers, query)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: e.to_string(),
            })
    }

    async fn generate(&self, generation: &RagGeneration, query: &str, context: &str) -> Result<String, ToolError> {
        let system = render(&generation.system_prompt, &[("context", context)]);
        let mut request = ProviderRequest::new("", &system, vec![Message::user(query)]);
        generation.model.apply(&mut request, &generation.kwargs);

        let response = complete_with_timeout(generation.provider.as_ref(), request, generation.timeout)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(response.message.content)
    }
}

fn unique_sources(results: &[RetrievalResult]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for r in results {
        if !r.source_path.is_empty() && !sources.contains(&r.source_path) {
            sources.push(r.source_path.clone());
        }
    }
    sources
}

#[async_trait]
impl Tool for RagTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question to look up in the knowledge base"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let results = self.contexts(query).await?;
        let context = results
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        let sources = unique_sources(&results);

        info!(tool = %self.name, contexts = results.len(), sources = sources.len(), "RAG tool retrieved");

        let artifact = match &self.generation {
            Some(generation) => self.generate(generation, query, &context).await?,
            None => context.clone(),
        };
        debug!(tool = %self.name, artifact_len = artifact.len());

        Ok(ToolResult::with_artifact(context, artifact, sources))
    }
}
