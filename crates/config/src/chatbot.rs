//! Per-turn chatbot configuration.
//!
//! Arrives as JSON with the turn request. Every field has a serde default so
//! callers only send what they change.

use chatmesh_core::Message;
use chatmesh_core::timeout::TimeoutConfig;
use serde::{Deserialize, Serialize};

use crate::ConfigError;
use crate::model::ModelKwargs;
use crate::prompts::Prompts;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatbotMode {
    /// Single completion, no retrieval or tools
    #[default]
    Chat,
    /// Intention detection, retrieval and tool calling
    Agent,
}

impl std::fmt::Display for ChatbotMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatbotMode::Chat => write!(f, "chat mode"),
            ChatbotMode::Agent => write!(f, "agent mode"),
        }
    }
}

/// Which model a step uses and how it samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Empty means the app's default model
    pub model_id: String,
    pub model_kwargs: ModelKwargs,
}

impl LlmConfig {
    pub fn model_id_or<'a>(&'a self, default: &'a str) -> &'a str {
        if self.model_id.is_empty() { default } else { &self.model_id }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Zh,
    En,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// Question/answer pairs; hits are atomic
    Qq,
    /// Chunked documents
    #[default]
    Qd,
}

/// Fields shared by every retriever: where to search and how to embed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub index_name: String,

    #[serde(default = "default_vector_field")]
    pub vector_field: String,

    /// Metadata field holding the source path
    #[serde(default = "default_source_field")]
    pub source_field: String,

    #[serde(default)]
    pub lang: Lang,

    /// Empty means the app's embedding model
    #[serde(default)]
    pub embedding_model_id: String,

    /// Embedding model family; `m3` is symmetric and gets no query prompt
    #[serde(default = "default_model_type")]
    pub model_type: String,

    /// When set, the index is exposed to the agent as its own RAG tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_vector_field() -> String {
    "vector_field".into()
}
fn default_source_field() -> String {
    "file_path".into()
}
fn default_model_type() -> String {
    "bce".into()
}
fn default_top_k() -> usize {
    5
}
fn default_context_num() -> usize {
    1
}

impl IndexConfig {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            vector_field: default_vector_field(),
            source_field: default_source_field(),
            lang: Lang::default(),
            embedding_model_id: String::new(),
            model_type: default_model_type(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRetrieverConfig {
    #[serde(flatten)]
    pub index: IndexConfig,

    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRetrieverConfig {
    #[serde(flatten)]
    pub index: IndexConfig,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub index_type: IndexType,

    /// Reassemble the whole source document instead of a window
    #[serde(default)]
    pub using_whole_doc: bool,

    /// Window size on each side of a hit
    #[serde(default = "default_context_num")]
    pub context_num: usize,

    /// Whole-document mode keeps only these content types (empty = any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_content_types: Vec<String>,

    /// Restrict to API documents (`metadata.is_api = true`)
    #[serde(default)]
    pub api_only: bool,
}

impl DocumentRetrieverConfig {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index: IndexConfig::new(index_name),
            top_k: default_top_k(),
            index_type: IndexType::Qd,
            using_whole_doc: false,
            context_num: default_context_num(),
            allowed_content_types: Vec::new(),
            api_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentionRetrieverConfig {
    #[serde(flatten)]
    pub index: IndexConfig,

    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryProcessConfig {
    /// Rewrite follow-up questions into standalone ones
    pub enabled: bool,
    pub llm_config: LlmConfig,
}

impl Default for QueryProcessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            llm_config: LlmConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QqMatchConfig {
    pub retrievers: Vec<QuestionRetrieverConfig>,
    /// Above this a matched question's answer is returned directly
    pub qq_match_threshold: f32,
    /// Above this a matched pair joins the agent's context
    pub qq_in_rag_context_threshold: f32,
}

impl Default for QqMatchConfig {
    fn default() -> Self {
        Self {
            retrievers: Vec::new(),
            qq_match_threshold: 0.9,
            qq_in_rag_context_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentionConfig {
    pub retrievers: Vec<IntentionRetrieverConfig>,
    pub intent_threshold: f32,
    pub all_knowledge_in_agent_threshold: f32,
    /// Answer given when nothing at all was found; unset means the agent
    /// runs anyway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_ready_answer: Option<String>,
}

impl Default for IntentionConfig {
    fn default() -> Self {
        Self {
            retrievers: Vec::new(),
            intent_threshold: 0.8,
            all_knowledge_in_agent_threshold: 0.5,
            not_ready_answer: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivateKnowledgeConfig {
    pub retrievers: Vec<DocumentRetrieverConfig>,
    /// When set, RAG tools answer with a grounded completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_config: Option<LlmConfig>,
}

/// An external tool reached over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointToolConfig {
    pub name: String,
    pub description: String,
    pub url: String,
    /// JSON Schema `properties` of the arguments object
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub return_direct: bool,
}

impl EndpointToolConfig {
    pub fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// An agent tool: a registered name, or an endpoint to register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentToolSpec {
    Name(String),
    Endpoint(EndpointToolConfig),
}

impl AgentToolSpec {
    pub fn name(&self) -> &str {
        match self {
            AgentToolSpec::Name(name) => name,
            AgentToolSpec::Endpoint(endpoint) => &endpoint.name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub llm_config: LlmConfig,
    pub tools: Vec<AgentToolSpec>,
    /// Skip intention detection and always call the global RAG tool
    pub only_use_rag_tool: bool,
    /// Require a tool call when the model supports it
    pub tool_choice_any: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatbotConfig {
    pub chatbot_mode: ChatbotMode,
    pub group_name: String,
    pub chatbot_id: String,
    pub use_history: bool,
    pub max_rounds_in_memory: usize,
    pub enable_trace: bool,
    /// Total node executions allowed per turn
    pub recursion_limit: usize,
    pub chat_config: LlmConfig,
    pub query_process_config: QueryProcessConfig,
    pub qq_match_config: QqMatchConfig,
    pub intention_config: IntentionConfig,
    pub private_knowledge_config: PrivateKnowledgeConfig,
    pub agent_config: AgentConfig,
    pub prompts: Prompts,
    /// Overrides the app's timeouts for this chatbot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutConfig>,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            chatbot_mode: ChatbotMode::Chat,
            group_name: "Admin".into(),
            chatbot_id: "admin".into(),
            use_history: true,
            max_rounds_in_memory: 7,
            enable_trace: true,
            recursion_limit: 20,
            chat_config: LlmConfig::default(),
            query_process_config: QueryProcessConfig::default(),
            qq_match_config: QqMatchConfig::default(),
            intention_config: IntentionConfig::default(),
            private_knowledge_config: PrivateKnowledgeConfig::default(),
            agent_config: AgentConfig::default(),
            prompts: Prompts::default(),
            timeouts: None,
        }
    }
}

fn check_unit_interval(name: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

impl ChatbotConfig {
    /// Parse and validate a chatbot config from JSON.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_value(value).map_err(|e| ConfigError::ChatbotParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_interval("qq_match_threshold", self.qq_match_config.qq_match_threshold)?;
        check_unit_interval(
            "qq_in_rag_context_threshold",
            self.qq_match_config.qq_in_rag_context_threshold,
        )?;
        check_unit_interval("intent_threshold", self.intention_config.intent_threshold)?;
        check_unit_interval(
            "all_knowledge_in_agent_threshold",
            self.intention_config.all_knowledge_in_agent_threshold,
        )?;

        if self.recursion_limit == 0 {
            return Err(ConfigError::ValidationError("recursion_limit must be >= 1".into()));
        }

        let index_names = self
            .qq_match_config
            .retrievers
            .iter()
            .map(|r| &r.index.index_name)
            .chain(self.intention_config.retrievers.iter().map(|r| &r.index.index_name))
            .chain(self.private_knowledge_config.retrievers.iter().map(|r| &r.index.index_name));
        for name in index_names {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationError("retriever index_name must not be empty".into()));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for tool in &self.agent_config.tools {
            if let AgentToolSpec::Endpoint(endpoint) = tool {
                if !seen.insert(endpoint.name.as_str()) {
                    return Err(ConfigError::ValidationError(format!(
                        "endpoint tool '{}' declared twice",
                        endpoint.name
                    )));
                }
            }
        }

        if self.qq_match_config.qq_in_rag_context_threshold > self.qq_match_config.qq_match_threshold {
            tracing::warn!("qq_in_rag_context_threshold is above qq_match_threshold; weak matches will never be used");
        }

        Ok(())
    }

    /// The slice of history the turn may see.
    pub fn history_window<'a>(&self, history: &'a [Message]) -> &'a [Message] {
        if !self.use_history {
            return &[];
        }
        let keep = self.max_rounds_in_memory.saturating_mul(2);
        &history[history.len().saturating_sub(keep)..]
    }

    /// Timeouts for this chatbot, falling back to `app_default`.
    pub fn timeouts_or(&self, app_default: &TimeoutConfig) -> TimeoutConfig {
        self.timeouts.clone().unwrap_or_else(|| app_default.clone())
    }
}
