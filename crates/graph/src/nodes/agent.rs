//! The agent node: one tool-calling completion per visit.

use chatmesh_config::prompts::render;
use chatmesh_core::tool::{Scene, ToolDefinition};
use chatmesh_core::{Error, Message, MessageToolCall, ProviderRequest, ToolChoice};
use chatmesh_retrieval::IntentionExample;
use chrono::{DateTime, Datelike, FixedOffset};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::TurnContext;
use crate::state::{ConversationState, StateUpdate};

/// Separates a tool's description from its few-shot examples.
pub const FEWSHOT_HEADER: &str = "\n\nHere are some examples where this tool are called:\n";

const WEEKDAYS: [&str; 7] = ["星期一", "星期二", "星期三", "星期四", "星期五", "星期六", "星期日"];

/// `(date, weekday)` as the agent prompt shows them, e.g. `2024年05月01日`, `星期三`.
pub fn china_date(now: &DateTime<FixedOffset>) -> (String, &'static str) {
    let date = format!("{}年{:02}月{:02}日", now.year(), now.month(), now.day());
    (date, WEEKDAYS[now.weekday().num_days_from_monday() as usize])
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// `definition` with the examples that call it appended to its description.
fn with_examples(mut definition: ToolDefinition, examples: &[IntentionExample], template: &str) -> ToolDefinition {
    let rendered: Vec<String> = examples
        .iter()
        .filter(|e| e.intent == definition.name)
        .map(|e| {
            let args = serde_json::to_string(&e.kwargs).unwrap_or_else(|_| "{}".into());
            render(template, &[("query", &e.query), ("args", &args)])
        })
        .collect();
    if !rendered.is_empty() {
        definition.description.push_str(FEWSHOT_HEADER);
        definition.description.push_str(&rendered.join("\n\n"));
    }
    definition
}

impl TurnContext {
    /// Candidate tool names: few-shot intents first, then the configured
    /// agent tools. Intents naming unregistered tools are dropped.
    fn candidate_tools(&self, state: &ConversationState) -> Vec<String> {
        if self.config.agent_config.only_use_rag_tool {
            return vec![self.tools.all_knowledge.name.clone()];
        }

        let mut names = Vec::new();
        for example in &state.fewshot_examples {
            if self.registry.contains(&Scene::Common, &example.intent) {
                push_unique(&mut names, &example.intent);
            } else {
                warn!(intent = %example.intent, "Few-shot intent has no registered tool, ignoring");
            }
        }
        for name in &self.tools.agent_tools {
            push_unique(&mut names, name);
        }
        names
    }

    fn agent_system_prompt(&self, state: &ConversationState) -> String {
        let (date, weekday) = china_date(&self.now);
        let context = state
            .qq_match_results
            .iter()
            .chain(&state.contexts)
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        render(
            &self.config.prompts.agent_system_prompt,
            &[("date", &date), ("weekday", weekday), ("context", &context)],
        )
    }
}

/// One agent step.
///
/// - a single successful returns-direct tool result is the final answer
/// - with `only_use_rag_tool`, the first step calls the all-knowledge tool
///   without asking the model
/// - otherwise the model sees the candidate tools and either calls some
///   or answers
pub(super) async fn agent(ctx: &TurnContext, state: &ConversationState) -> Result<StateUpdate, Error> {
    if let [only] = state.last_tool_results.as_slice() {
        let returns_direct = ctx
            .registry
            .get(&Scene::Common, &only.tool_name)
            .is_ok_and(|tool| tool.returns_direct());
        if returns_direct && !only.is_error {
            info!(tool = %only.tool_name, "Returning tool result directly");
            let answer = only.artifact.clone().unwrap_or_else(|| only.content.clone());
            return Ok(StateUpdate {
                sources: only.sources.clone(),
                ..StateUpdate::new()
                    .answer(answer)
                    .exit()
                    .trace(format!("**agent**: `{}` returns directly", only.tool_name))
            });
        }
    }

    let candidates = ctx.candidate_tools(state);

    if ctx.config.agent_config.only_use_rag_tool && state.tool_history.is_empty() {
        let name = ctx.tools.all_knowledge.name.clone();
        let call = MessageToolCall::new(&name, &json!({"query": state.query}));
        return Ok(StateUpdate {
            tool_history: vec![Message::assistant_tool_calls("", vec![call])],
            candidate_tools: Some(candidates),
            ..StateUpdate::new().trace(format!("**agent**: forced `{name}`"))
        });
    }

    let mut definitions = Vec::with_capacity(candidates.len());
    for name in &candidates {
        let tool = ctx.registry.get(&Scene::Common, name)?;
        definitions.push(with_examples(
            tool.definition,
            &state.fewshot_examples,
            &ctx.config.prompts.tool_fewshot_prompt,
        ));
    }

    let mut messages = state.chat_history.clone();
    messages.push(Message::user(state.query.as_str()));
    messages.extend(state.tool_history.iter().cloned());

    let mut request = ProviderRequest::new("", &ctx.agent_system_prompt(state), messages);
    let llm = &ctx.config.agent_config.llm_config;
    if !definitions.is_empty() {
        let any = ctx.config.agent_config.tool_choice_any && ctx.model(llm).enable_any_tool_choice;
        request.tool_choice = Some(if any { ToolChoice::Any } else { ToolChoice::Auto });
        request.tools = definitions;
    }

    debug!(tools = ?candidates, messages = request.messages.len(), "Agent completion");
    let response = ctx.complete(llm, request).await?;

    if response.tool_calls().is_empty() {
        return Ok(StateUpdate {
            candidate_tools: Some(candidates),
            ..StateUpdate::new()
                .answer(response.message.content)
                .exit()
                .trace("**agent**: no need tool calling")
        });
    }

    let called: Vec<String> = response.tool_calls().iter().map(|c| format!("`{}`", c.name)).collect();
    Ok(StateUpdate {
        tool_history: vec![response.message],
        candidate_tools: Some(candidates),
        ..StateUpdate::new().trace(format!("**agent**: calling {}", called.join(", ")))
    })
}
