//! tools_execution: run every call of the last assistant message.

use chatmesh_core::error::ToolError;
use chatmesh_core::message::Role;
use chatmesh_core::tool::{Scene, ToolCall};
use chatmesh_core::{Message, MessageToolCall};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::context::TurnContext;
use crate::state::{ConversationState, StateUpdate, ToolOutcome};

/// Tool failures reach the model as a tool message starting with this.
pub const TOOL_CALL_ERROR_PREFIX: &str = "Error: ";

fn parse_arguments(call: &MessageToolCall) -> Result<serde_json::Value, ToolError> {
    if call.arguments.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(&call.arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("{}: {e}", call.name)))
}

async fn run_call(ctx: &TurnContext, candidates: &[String], call: &MessageToolCall) -> Result<chatmesh_core::ToolResult, ToolError> {
    if !candidates.iter().any(|c| c == &call.name) {
        return Err(ToolError::NotFound(call.name.clone()));
    }
    let tool_call = ToolCall {
        id: call.id.clone(),
        name: call.name.clone(),
        arguments: parse_arguments(call)?,
    };

    let limit = ctx.timeouts.tool();
    match tokio::time::timeout(limit, ctx.registry.execute(&Scene::Common, &tool_call)).await {
        Ok(result) => result,
        Err(_) => Err(ToolError::Timeout {
            tool_name: call.name.clone(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

async fn execute_call(ctx: &TurnContext, candidates: &[String], call: &MessageToolCall) -> ToolOutcome {
    match run_call(ctx, candidates, call).await {
        Ok(result) => ToolOutcome {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            artifact: result.artifact().map(str::to_string),
            sources: result.sources(),
            is_error: !result.success,
            content: result.output,
        },
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool call failed");
            ToolOutcome {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: format!("{TOOL_CALL_ERROR_PREFIX}{e}"),
                artifact: None,
                sources: Vec::new(),
                is_error: true,
            }
        }
    }
}

/// Every call runs concurrently; each yields exactly one tool message,
/// failures included.
pub(super) async fn tools_execution(ctx: &TurnContext, state: &ConversationState) -> StateUpdate {
    let calls = state
        .tool_history
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.tool_calls.as_slice())
        .unwrap_or_default();

    debug!(calls = calls.len(), "Executing tool calls");
    let outcomes = join_all(calls.iter().map(|call| execute_call(ctx, &state.candidate_tools, call))).await;

    let messages: Vec<Message> = outcomes
        .iter()
        .map(|o| Message::tool_result(&o.call_id, &o.tool_name, &o.content))
        .collect();
    let lines: Vec<String> = outcomes
        .iter()
        .map(|o| format!("- `{}`: {}", o.tool_name, if o.is_error { "failed" } else { "ok" }))
        .collect();

    StateUpdate {
        tool_history: messages,
        last_tool_results: Some(outcomes),
        ..StateUpdate::new().trace(format!("**tools_execution**\n\n{}", lines.join("\n")))
    }
}
