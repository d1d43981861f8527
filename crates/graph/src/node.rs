//! Graph nodes and the conditional edges between them.
//!
//! ```text
//! query_preprocess ──chat mode──▶ llm_direct_results_generation ──▶ final_results_preparation
//!        │
//!   agent mode
//!        ▼
//! intention_detection ──similar query found──▶ matched_query_return ──▶ final
//!        │            ──intention not ready──▶ intention_not_ready ──▶ final
//!   intention detected
//!        ▼
//!      agent ◀────────── tools_execution
//!        │  ──valid tool calling──▶ ┘
//!        └──no need tool calling──▶ final_results_preparation ──▶ END
//! ```

use chatmesh_config::ChatbotMode;
use std::fmt;

use crate::state::{ConversationState, IntentType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    QueryPreprocess,
    LlmDirectResultsGeneration,
    IntentionDetection,
    MatchedQueryReturn,
    IntentionNotReady,
    Agent,
    ToolsExecution,
    FinalResultsPreparation,
}

impl Node {
    /// Every turn starts here.
    pub const ENTRY: Node = Node::QueryPreprocess;

    pub fn as_str(&self) -> &'static str {
        match self {
            Node::QueryPreprocess => "query_preprocess",
            Node::LlmDirectResultsGeneration => "llm_direct_results_generation",
            Node::IntentionDetection => "intention_detection",
            Node::MatchedQueryReturn => "matched_query_return",
            Node::IntentionNotReady => "intention_not_ready",
            Node::Agent => "agent",
            Node::ToolsExecution => "tools_execution",
            Node::FinalResultsPreparation => "final_results_preparation",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing edge: the route label taken and where it leads.
/// `next` is `None` at the end of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub label: String,
    pub next: Option<Node>,
}

impl Edge {
    fn to(label: impl Into<String>, next: Node) -> Self {
        Self {
            label: label.into(),
            next: Some(next),
        }
    }
}

/// Pick the edge out of `node` for the current state.
pub fn route(node: Node, state: &ConversationState, mode: ChatbotMode) -> Edge {
    match node {
        Node::QueryPreprocess => match mode {
            ChatbotMode::Chat => Edge::to(mode.to_string(), Node::LlmDirectResultsGeneration),
            ChatbotMode::Agent => Edge::to(mode.to_string(), Node::IntentionDetection),
        },
        Node::IntentionDetection => {
            let intent = state.intent_type.unwrap_or(IntentType::IntentionDetected);
            let next = match intent {
                IntentType::SimilarQueryFound => Node::MatchedQueryReturn,
                IntentType::IntentionNotReady => Node::IntentionNotReady,
                _ => Node::Agent,
            };
            Edge::to(intent.to_string(), next)
        }
        Node::Agent if state.exit_tool_calling => Edge::to("no need tool calling", Node::FinalResultsPreparation),
        Node::Agent => Edge::to("valid tool calling", Node::ToolsExecution),
        Node::ToolsExecution => Edge::to("tool results", Node::Agent),
        Node::LlmDirectResultsGeneration | Node::MatchedQueryReturn | Node::IntentionNotReady => {
            Edge::to("answer ready", Node::FinalResultsPreparation)
        }
        Node::FinalResultsPreparation => Edge {
            label: "end".into(),
            next: None,
        },
    }
}
