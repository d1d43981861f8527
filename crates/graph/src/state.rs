//! Conversation state and the partial updates nodes return.
//!
//! Nodes never mutate the state directly. Each returns a [`StateUpdate`]
//! which the runner merges with [`ConversationState::apply`]:
//!
//! | field | rule |
//! |---|---|
//! | `chat_history`, `tool_history`, `trace`, `qq_match_results`, `contexts`, `sources` | append |
//! | `last_tool_results`, `candidate_tools`, `fewshot_examples` | replace when present |
//! | scalars (`query_rewrite`, `intent_type`, `exit_tool_calling`, `answer`) | overwrite when present |
//! | `extra` | deep merge |

use chatmesh_core::Message;
use chatmesh_retrieval::{IntentionExample, RetrievalResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// How the turn is being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Chat,
    Agent,
    SimilarQueryFound,
    IntentionDetected,
    IntentionNotReady,
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IntentType::Chat => "chat",
            IntentType::Agent => "agent",
            IntentType::SimilarQueryFound => "similar query found",
            IntentType::IntentionDetected => "intention detected",
            IntentType::IntentionNotReady => "intention not ready",
        })
    }
}

/// The outcome of one tool call, as seen by the next agent step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub call_id: String,
    pub tool_name: String,
    /// What the model sees (the output, or the error message)
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub is_error: bool,
}

/// Everything a turn knows. Owned by one turn, never shared.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub query: String,
    pub query_rewrite: Option<String>,
    pub chat_history: Vec<Message>,
    pub intent_type: Option<IntentType>,
    /// Weak question matches used as agent context
    pub qq_match_results: Vec<RetrievalResult>,
    /// All-knowledge retrieval above the agent threshold
    pub contexts: Vec<RetrievalResult>,
    pub fewshot_examples: Vec<IntentionExample>,
    pub candidate_tools: Vec<String>,
    /// Assistant tool-call and tool-result messages, append-only
    pub tool_history: Vec<Message>,
    pub last_tool_results: Vec<ToolOutcome>,
    pub exit_tool_calling: bool,
    pub answer: Option<String>,
    pub trace: Vec<String>,
    pub sources: Vec<String>,
    pub extra: Map<String, Value>,
}

impl ConversationState {
    pub fn new(query: impl Into<String>, chat_history: Vec<Message>) -> Self {
        Self {
            query: query.into(),
            chat_history,
            ..Self::default()
        }
    }

    /// The query retrieval should use: the rewrite when there is one.
    pub fn effective_query(&self) -> &str {
        self.query_rewrite.as_deref().unwrap_or(&self.query)
    }

    /// Merge a node's update.
    pub fn apply(&mut self, update: StateUpdate) {
        let StateUpdate {
            query_rewrite,
            chat_history,
            intent_type,
            qq_match_results,
            contexts,
            fewshot_examples,
            candidate_tools,
            tool_history,
            last_tool_results,
            exit_tool_calling,
            answer,
            trace,
            sources,
            extra,
        } = update;

        if query_rewrite.is_some() {
            self.query_rewrite = query_rewrite;
        }
        if intent_type.is_some() {
            self.intent_type = intent_type;
        }
        if let Some(exit) = exit_tool_calling {
            self.exit_tool_calling = exit;
        }
        if answer.is_some() {
            self.answer = answer;
        }

        self.chat_history.extend(chat_history);
        self.qq_match_results.extend(qq_match_results);
        self.contexts.extend(contexts);
        self.tool_history.extend(tool_history);
        self.trace.extend(trace);
        for source in sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }

        if let Some(examples) = fewshot_examples {
            self.fewshot_examples = examples;
        }
        if let Some(tools) = candidate_tools {
            self.candidate_tools = tools;
        }
        if let Some(results) = last_tool_results {
            self.last_tool_results = results;
        }

        for (key, value) in extra {
            match self.extra.get_mut(&key) {
                Some(existing) => deep_merge(existing, value),
                None => {
                    self.extra.insert(key, value);
                }
            }
        }
    }
}

/// Merge `incoming` into `target`: objects merge key by key, anything
/// else is replaced.
pub fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, incoming) => *target = incoming,
    }
}

/// A node's partial update. Empty fields leave the state untouched.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub query_rewrite: Option<String>,
    pub chat_history: Vec<Message>,
    pub intent_type: Option<IntentType>,
    pub qq_match_results: Vec<RetrievalResult>,
    pub contexts: Vec<RetrievalResult>,
    pub fewshot_examples: Option<Vec<IntentionExample>>,
    pub candidate_tools: Option<Vec<String>>,
    pub tool_history: Vec<Message>,
    pub last_tool_results: Option<Vec<ToolOutcome>>,
    pub exit_tool_calling: Option<bool>,
    pub answer: Option<String>,
    pub trace: Vec<String>,
    pub sources: Vec<String>,
    pub extra: Map<String, Value>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    pub fn intent(mut self, intent_type: IntentType) -> Self {
        self.intent_type = Some(intent_type);
        self
    }

    pub fn exit(mut self) -> Self {
        self.exit_tool_calling = Some(true);
        self
    }

    pub fn trace(mut self, markdown: impl Into<String>) -> Self {
        self.trace.push(markdown.into());
        self
    }

    pub fn extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}
