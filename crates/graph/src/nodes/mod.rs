//! Node implementations. Each takes the state by reference and returns
//! a [`StateUpdate`]; none of them mutate the state.

mod agent;
mod finalize;
mod intention;
mod preprocess;
mod tools_execution;

pub use agent::{FEWSHOT_HEADER, china_date};
pub use finalize::strip_thinking;
pub use tools_execution::TOOL_CALL_ERROR_PREFIX;

use async_trait::async_trait;
use chatmesh_core::Error;
use chatmesh_core::message::Role;

use crate::context::TurnContext;
use crate::node::Node;
use crate::runner::NodeExecutor;
use crate::state::{ConversationState, StateUpdate};

#[async_trait]
impl NodeExecutor for TurnContext {
    async fn execute(&self, node: Node, state: &ConversationState) -> Result<StateUpdate, Error> {
        match node {
            Node::QueryPreprocess => preprocess::query_preprocess(self, state).await,
            Node::LlmDirectResultsGeneration => preprocess::llm_direct_results_generation(self, state).await,
            Node::IntentionDetection => intention::intention_detection(self, state).await,
            Node::MatchedQueryReturn => Ok(intention::matched_query_return(state)),
            Node::IntentionNotReady => Ok(intention::intention_not_ready(self)),
            Node::Agent => agent::agent(self, state).await,
            Node::ToolsExecution => Ok(tools_execution::tools_execution(self, state).await),
            Node::FinalResultsPreparation => Ok(finalize::final_results_preparation(self, state)),
        }
    }
}

/// History as `role: content` lines, for prompts that take it as text.
fn history_lines(history: &[chatmesh_core::Message]) -> String {
    history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
