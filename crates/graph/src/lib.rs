//! # chatmesh-graph
//!
//! The dialog orchestration graph. A turn starts at `query_preprocess` and
//! walks the nodes in [`node`] until `final_results_preparation`:
//!
//! - chat mode answers with a single completion
//! - agent mode checks the FAQ index, gathers few-shot intentions or
//!   knowledge, then loops between the agent and tool execution
//!
//! [`TurnRunner`] is the entry point; [`GraphRunner`] enforces the
//! recursion limit and cancellation.

pub mod context;
pub mod node;
pub mod nodes;
pub mod runner;
pub mod state;
pub mod turn;

pub use context::TurnContext;
pub use node::{Edge, Node, route};
pub use runner::{GraphRunner, NodeExecutor};
pub use state::{ConversationState, IntentType, StateUpdate, ToolOutcome};
pub use turn::{FAILURE_ANSWER, TurnInput, TurnOutput, TurnRunner};

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider and context builders for node tests.

    use async_trait::async_trait;
    use chatmesh_config::ChatbotConfig;
    use chatmesh_core::error::ProviderError;
    use chatmesh_core::provider::{EmbeddingRequest, EmbeddingResponse, Usage};
    use chatmesh_core::{DocumentStore, Message, MessageToolCall, Provider, ProviderRequest, ProviderResponse};
    use chatmesh_store::InMemoryStore;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use crate::context::TurnContext;
    use crate::turn::TurnRunner;

    /// Returns scripted completions in order and records each request.
    /// Embeds every text as `[1, 0]`. Runs out with an API error.
    pub struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResponse>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        pub fn new(responses: Vec<ProviderResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn texts(texts: &[&str]) -> Arc<Self> {
            Arc::new(Self::new(texts.iter().map(|t| text_response(t)).collect()))
        }

        pub fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.responses.lock().unwrap().pop_front().ok_or(ProviderError::ApiError {
                status_code: 500,
                message: "no scripted response left".into(),
            })
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                embeddings: request.inputs.iter().map(|_| vec![1.0, 0.0]).collect(),
                model: request.model,
            })
        }
    }

    fn response(message: Message) -> ProviderResponse {
        ProviderResponse {
            message,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        }
    }

    pub fn text_response(text: &str) -> ProviderResponse {
        response(Message::assistant(text))
    }

    pub fn tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
        response(Message::assistant_tool_calls("", tool_calls))
    }

    pub async fn context_with_store(
        config: ChatbotConfig,
        provider: Arc<ScriptedProvider>,
        store: Arc<dyn DocumentStore>,
    ) -> TurnContext {
        TurnRunner::new(provider, store).prepare(&config, false).unwrap()
    }

    pub async fn context_with(config: ChatbotConfig, provider: Arc<ScriptedProvider>) -> TurnContext {
        context_with_store(config, provider, Arc::new(InMemoryStore::new())).await
    }
}
