//! query_preprocess and llm_direct_results_generation.

use chatmesh_config::prompts::render;
use chatmesh_core::{Error, Message, ProviderRequest};
use tracing::{debug, warn};

use super::history_lines;
use crate::context::TurnContext;
use crate::state::{ConversationState, IntentType, StateUpdate};

/// Rewrite a follow-up question into a standalone one.
///
/// Skipped without history. A failed rewrite keeps the original query.
pub(super) async fn query_preprocess(ctx: &TurnContext, state: &ConversationState) -> Result<StateUpdate, Error> {
    let process = &ctx.config.query_process_config;
    if !process.enabled || state.chat_history.is_empty() {
        return Ok(StateUpdate::new().trace(format!("**query_preprocess**: `{}`", state.query)));
    }

    let prompt = render(
        &ctx.config.prompts.query_rewrite_prompt,
        &[("history", &history_lines(&state.chat_history)), ("query", &state.query)],
    );
    let request = ProviderRequest::new("", "", vec![Message::user(prompt)]);

    let rewrite = match ctx.complete(&process.llm_config, request).await {
        Ok(response) => response.message.content.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "Query rewrite failed, keeping the original query");
            String::new()
        }
    };

    if rewrite.is_empty() {
        return Ok(StateUpdate::new().trace(format!("**query_preprocess**: `{}` (not rewritten)", state.query)));
    }

    debug!(query = %state.query, rewrite = %rewrite, "Query rewritten");
    Ok(StateUpdate {
        query_rewrite: Some(rewrite.clone()),
        ..StateUpdate::new().trace(format!("**query_preprocess**: `{}` → `{rewrite}`", state.query))
    })
}

/// Chat mode: one completion over history and query, no retrieval.
pub(super) async fn llm_direct_results_generation(
    ctx: &TurnContext,
    state: &ConversationState,
) -> Result<StateUpdate, Error> {
    let mut messages = state.chat_history.clone();
    messages.push(Message::user(state.query.as_str()));
    let request = ProviderRequest::new("", &ctx.config.prompts.chat_system_prompt, messages);

    let response = ctx.complete(&ctx.config.chat_config, request).await?;
    Ok(StateUpdate::new()
        .intent(IntentType::Chat)
        .answer(response.message.content)
        .trace(format!("**llm_direct_results_generation**: model `{}`", response.model)))
}
