//! final_results_preparation.

use chatmesh_core::TurnEvent;
use regex_lite::Regex;
use tracing::warn;

use crate::context::TurnContext;
use crate::state::{ConversationState, StateUpdate};
use crate::turn::FAILURE_ANSWER;

/// Drop `<thinking>...</thinking>` blocks and surrounding whitespace.
pub fn strip_thinking(text: &str) -> String {
    match Regex::new(r"(?s)<thinking>.*?</thinking>") {
        Ok(re) => re.replace_all(text, "").trim().to_string(),
        Err(_) => text.trim().to_string(),
    }
}

pub(super) fn final_results_preparation(ctx: &TurnContext, state: &ConversationState) -> StateUpdate {
    let answer = state
        .answer
        .as_deref()
        .map(strip_thinking)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| {
            warn!("Turn ended without an answer");
            FAILURE_ANSWER.to_string()
        });

    if ctx.stream {
        ctx.events.publish(TurnEvent::Chunk { content: answer.clone() });
    }

    StateUpdate::new()
        .answer(answer)
        .trace(format!("**final_results_preparation**: {} source(s)", state.sources.len()))
}
