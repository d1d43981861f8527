//! Everything the nodes of one turn need, assembled at turn setup.

use chatmesh_config::{ChatbotConfig, LlmConfig, ModelConfig, ModelTable};
use chatmesh_core::error::ProviderError;
use chatmesh_core::timeout::complete_with_timeout;
use chatmesh_core::{EventBus, Provider, ProviderRequest, ProviderResponse, TimeoutConfig, ToolRegistry};
use chatmesh_retrieval::Retriever;
use chatmesh_tools::RegisteredTools;
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;

pub struct TurnContext {
    pub config: ChatbotConfig,
    pub provider: Arc<dyn Provider>,
    pub models: ModelTable,
    pub default_model: String,
    /// This turn's registry, seeded from the process-wide one
    pub registry: ToolRegistry,
    pub tools: RegisteredTools,
    pub question_retrievers: Vec<Arc<dyn Retriever>>,
    pub intention_retrievers: Vec<Arc<dyn Retriever>>,
    pub knowledge_retrievers: Vec<Arc<dyn Retriever>>,
    pub timeouts: TimeoutConfig,
    pub events: EventBus,
    /// Publish the final answer as a chunk event
    pub stream: bool,
    /// Turn start in the agent prompt's time zone
    pub now: DateTime<FixedOffset>,
}

impl TurnContext {
    pub fn model(&self, llm: &LlmConfig) -> ModelConfig {
        self.models.resolve(llm.model_id_or(&self.default_model))
    }

    /// Complete `request` with the model `llm` selects, under the
    /// completion timeout.
    pub async fn complete(&self, llm: &LlmConfig, mut request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.model(llm).apply(&mut request, &llm.model_kwargs);
        complete_with_timeout(self.provider.as_ref(), request, self.timeouts.completion()).await
    }
}
