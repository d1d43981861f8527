//! Turn entry point: set up per-turn tools and retrievers, run the graph,
//! package the response.

use chatmesh_config::{AppConfig, ChatbotConfig, ModelTable};
use chatmesh_core::{CancelToken, DocumentStore, Error, EventBus, Message, Provider, TimeoutConfig, ToolRegistry, TurnEvent};
use chatmesh_retrieval::{Backends, DocumentRetriever, IntentionRetriever, QuestionRetriever, Retriever};
use chatmesh_tools::{ToolContext, register_from_config};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::context::TurnContext;
use crate::runner::GraphRunner;
use crate::state::{ConversationState, IntentType};

/// The answer when a turn fails or produces nothing.
pub const FAILURE_ANSWER: &str = "Sorry, I couldn't generate an answer to your question. Please try again later.";

const CHINA_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    pub query: String,
    #[serde(default)]
    pub chat_history: Vec<Message>,
    #[serde(default)]
    pub chatbot_config: ChatbotConfig,
    /// Publish the answer as a chunk event
    #[serde(default)]
    pub stream: bool,
    /// Overrides `chatbot_config.enable_trace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_trace: Option<bool>,
}

impl TurnInput {
    pub fn new(query: impl Into<String>, chatbot_config: ChatbotConfig) -> Self {
        Self {
            query: query.into(),
            chat_history: Vec::new(),
            chatbot_config,
            stream: false,
            enable_trace: None,
        }
    }

    pub fn with_history(mut self, chat_history: Vec<Message>) -> Self {
        self.chat_history = chat_history;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutput {
    /// Never empty
    pub answer: String,
    pub sources: Vec<String>,
    /// Markdown trace entries; empty unless tracing is enabled
    pub trace: Vec<String>,
    pub intent_type: Option<IntentType>,
    pub extra: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs turns against shared services.
///
/// Cheap to share: every turn gets its own scoped tool registry and
/// retrievers, so concurrent turns never see each other's tools.
pub struct TurnRunner {
    provider: Arc<dyn Provider>,
    store: Arc<dyn DocumentStore>,
    registry: Arc<ToolRegistry>,
    models: ModelTable,
    default_model: String,
    embedding_model: String,
    timeouts: TimeoutConfig,
    events: EventBus,
}

impl TurnRunner {
    pub fn new(provider: Arc<dyn Provider>, store: Arc<dyn DocumentStore>) -> Self {
        let defaults = AppConfig::default();
        Self {
            provider,
            store,
            registry: Arc::new(ToolRegistry::new()),
            models: ModelTable::builtin(),
            default_model: defaults.default_model,
            embedding_model: defaults.embedding_model,
            timeouts: defaults.timeouts,
            events: EventBus::default(),
        }
    }

    /// Models, timeouts and defaults from the app config.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            models: config.model_table(),
            default_model: config.default_model.clone(),
            embedding_model: config.embedding_model.clone(),
            timeouts: config.timeouts.clone(),
            ..Self::new(provider, store)
        }
    }

    /// Process-wide tools every turn can call.
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Build the turn's context: scoped registry, config-declared tools,
    /// retrievers.
    pub(crate) fn prepare(&self, config: &ChatbotConfig, stream: bool) -> Result<TurnContext, Error> {
        config.validate()?;
        let timeouts = config.timeouts_or(&self.timeouts);
        let backends = Backends::new(self.store.clone(), self.provider.clone(), self.embedding_model.clone())
            .with_timeouts(timeouts.clone());

        let question_retrievers = config
            .qq_match_config
            .retrievers
            .iter()
            .map(|r| Arc::new(QuestionRetriever::new(r.clone(), backends.clone())) as Arc<dyn Retriever>)
            .collect();
        let intention_retrievers = config
            .intention_config
            .retrievers
            .iter()
            .map(|r| Arc::new(IntentionRetriever::new(r.clone(), backends.clone())) as Arc<dyn Retriever>)
            .collect();
        let knowledge_retrievers = config
            .private_knowledge_config
            .retrievers
            .iter()
            .map(|r| Arc::new(DocumentRetriever::new(r.clone(), backends.clone())) as Arc<dyn Retriever>)
            .collect();

        let registry = self.registry.scoped();
        let tools = register_from_config(
            &registry,
            config,
            &ToolContext {
                backends,
                provider: self.provider.clone(),
                models: self.models.clone(),
                default_model: self.default_model.clone(),
            },
        )?;

        let offset = FixedOffset::east_opt(CHINA_OFFSET_SECS).unwrap_or(Utc.fix());
        Ok(TurnContext {
            config: config.clone(),
            provider: self.provider.clone(),
            models: self.models.clone(),
            default_model: self.default_model.clone(),
            registry,
            tools,
            question_retrievers,
            intention_retrievers,
            knowledge_retrievers,
            timeouts,
            events: self.events.clone(),
            stream,
            now: Utc::now().with_timezone(&offset),
        })
    }

    /// Answer one query. Failures are reported in the output, never as an
    /// empty answer.
    pub async fn run(&self, input: TurnInput, cancel: CancelToken) -> TurnOutput {
        let started = Instant::now();
        let config = input.chatbot_config;
        let enable_trace = input.enable_trace.unwrap_or(config.enable_trace);
        info!(
            chatbot_id = %config.chatbot_id,
            mode = %config.chatbot_mode,
            history = input.chat_history.len(),
            "Turn started"
        );

        let history = config.history_window(&input.chat_history).to_vec();
        let mut state = ConversationState::new(input.query, history);

        let mut runner = GraphRunner::new(config.chatbot_mode, config.recursion_limit);
        if enable_trace {
            runner = runner.with_events(self.events.clone());
        }

        let result = match self.prepare(&config, input.stream) {
            Ok(ctx) => runner.run(&ctx, &mut state, &cancel).await,
            Err(e) => Err(e),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mut extra = std::mem::take(&mut state.extra);
        extra.insert("elapsed_ms".into(), elapsed_ms.into());
        if let Some(rewrite) = &state.query_rewrite {
            extra.insert("query_rewrite".into(), rewrite.clone().into());
        }

        let (answer, error) = match result {
            Ok(()) => {
                info!(elapsed_ms, intent = ?state.intent_type, "Turn finished");
                (state.answer.take().unwrap_or_else(|| FAILURE_ANSWER.to_string()), None)
            }
            Err(e) => {
                error!(error = %e, elapsed_ms, "Turn failed");
                let entry = format!("**error**: {e}");
                if enable_trace {
                    self.events.publish(TurnEvent::trace(entry.clone()));
                }
                state.trace.push(entry);
                (FAILURE_ANSWER.to_string(), Some(e.to_string()))
            }
        };

        TurnOutput {
            answer,
            sources: state.sources,
            trace: if enable_trace { state.trace } else { Vec::new() },
            intent_type: state.intent_type,
            extra,
            error,
        }
    }
}
