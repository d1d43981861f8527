//! Prompt templates with built-in defaults.
//!
//! Templates use `{name}` placeholders filled by [`render`]. Any template
//! can be overridden per chatbot through `ChatbotConfig.prompts`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    /// System prompt for chat mode
    pub chat_system_prompt: String,

    /// Standalone-question rewrite; placeholders `{history}`, `{query}`
    pub query_rewrite_prompt: String,

    /// Agent system prompt; placeholders `{date}`, `{weekday}`, `{context}`
    pub agent_system_prompt: String,

    /// One few-shot example appended to a tool description; `{query}`, `{args}`
    pub tool_fewshot_prompt: String,

    /// Grounded answer over retrieved contexts; `{context}`
    pub rag_system_prompt: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            chat_system_prompt: "You are a helpful AI assistant. Answer in the language of the question.".into(),
            query_rewrite_prompt: "Given the conversation below and a follow-up question, rewrite the \
follow-up question as a standalone question. Keep the original language. Output only the rewritten question.\n\n\
<conversation>\n{history}\n</conversation>\n\nFollow-up question: {query}"
                .into(),
            agent_system_prompt: "You are a helpful AI assistant. Today is {date}, {weekday}.\n\
Use the available tools when they help answer the user's question. If a tool fails, explain what went wrong.\n\
Here is background knowledge that may be relevant:\n<context>\n{context}\n</context>"
                .into(),
            tool_fewshot_prompt: "query: {query}\nargs: {args}".into(),
            rag_system_prompt: "You are a customer service agent. Answer the question using only the \
documents below. If the documents do not contain the answer, say that you don't know.\n\n<docs>\n{context}\n</docs>"
                .into(),
        }
    }
}

/// Replace each `{key}` in `template` with its value.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}
