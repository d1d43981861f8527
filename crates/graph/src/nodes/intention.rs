//! intention_detection and the two nodes it can short-circuit to.

use chatmesh_core::Error;
use chatmesh_core::tool::normalize_tool_name;
use chatmesh_retrieval::{IntentionExample, RetrievalResult, merge_retrieve};
use serde_json::json;
use tracing::{debug, info};

use crate::context::TurnContext;
use crate::state::{ConversationState, IntentType, StateUpdate};

/// A weakly matched FAQ pair as agent context.
fn weak_match(result: &RetrievalResult) -> RetrievalResult {
    let question = result.extra_str("question").unwrap_or(&result.content);
    let answer = result.extra_str("answer").unwrap_or_default();
    RetrievalResult::new(
        format!("问题: {question}, \n答案：{answer}"),
        result.source_path.clone(),
        result.score,
    )
}

fn bullet_list(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .map(|r| format!("- `{:.3}` {}", r.score, r.source_path))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decide how the agent-mode turn is answered.
///
/// 1. A FAQ question scoring above `qq_match_threshold` answers the turn.
/// 2. Pairs above `qq_in_rag_context_threshold` become agent context.
/// 3. Unless the agent only uses the RAG tool: few-shot intention examples,
///    or, when there are none, all-knowledge retrieval above
///    `all_knowledge_in_agent_threshold`.
/// 4. Nothing found and a not-ready answer configured: not ready.
pub(super) async fn intention_detection(ctx: &TurnContext, state: &ConversationState) -> Result<StateUpdate, Error> {
    let query = state.effective_query();
    let qq_config = &ctx.config.qq_match_config;
    let intention_config = &ctx.config.intention_config;

    let matches = if ctx.question_retrievers.is_empty() {
        Vec::new()
    } else {
        merge_retrieve(&ctx.question_retrievers, query).await?
    };

    if let Some(top) = matches.first().filter(|r| r.score > qq_config.qq_match_threshold) {
        info!(score = top.score, source = %top.source_path, "Similar query found");
        let answer = top.extra_str("answer").unwrap_or(&top.content).to_string();
        return Ok(StateUpdate {
            sources: vec![top.source_path.clone()],
            ..StateUpdate::new()
                .intent(IntentType::SimilarQueryFound)
                .answer(answer)
                .trace(format!(
                    "**intention_detection**: similar query found (`{:.3}`)\n\n{}",
                    top.score,
                    bullet_list(std::slice::from_ref(top))
                ))
        });
    }

    let weak: Vec<RetrievalResult> = matches
        .iter()
        .filter(|r| r.score > qq_config.qq_in_rag_context_threshold)
        .map(weak_match)
        .collect();

    if ctx.config.agent_config.only_use_rag_tool {
        return Ok(StateUpdate {
            qq_match_results: weak,
            ..StateUpdate::new()
                .intent(IntentType::IntentionDetected)
                .trace("**intention_detection**: only the RAG tool is used")
        });
    }

    let mut examples = if ctx.intention_retrievers.is_empty() {
        Vec::new()
    } else {
        let results = merge_retrieve(&ctx.intention_retrievers, query).await?;
        IntentionExample::above(&results, intention_config.intent_threshold)
    };
    for example in &mut examples {
        example.intent = normalize_tool_name(&example.intent);
    }

    let contexts: Vec<RetrievalResult> = if examples.is_empty() && !ctx.knowledge_retrievers.is_empty() {
        merge_retrieve(&ctx.knowledge_retrievers, query)
            .await?
            .into_iter()
            .filter(|r| r.score >= intention_config.all_knowledge_in_agent_threshold)
            .collect()
    } else {
        Vec::new()
    };

    debug!(
        weak_matches = weak.len(),
        examples = examples.len(),
        contexts = contexts.len(),
        "Intention detection done"
    );

    let nothing_found = weak.is_empty() && examples.is_empty() && contexts.is_empty();
    let intent = match &intention_config.not_ready_answer {
        Some(_) if nothing_found => IntentType::IntentionNotReady,
        _ => IntentType::IntentionDetected,
    };

    let mut trace = format!("**intention_detection**: {intent}");
    if !examples.is_empty() {
        let intents: Vec<String> = examples.iter().map(|e| format!("`{}` ({:.3})", e.intent, e.score)).collect();
        trace.push_str(&format!("\n\nfew-shot intents: {}", intents.join(", ")));
    }
    if !contexts.is_empty() {
        trace.push_str(&format!("\n\nall-knowledge context:\n{}", bullet_list(&contexts)));
    }

    let fewshot_debug = json!(examples.iter().map(|e| json!({"intent": e.intent, "score": e.score})).collect::<Vec<_>>());
    Ok(StateUpdate {
        qq_match_results: weak,
        sources: contexts.iter().map(|r| r.source_path.clone()).collect(),
        contexts,
        fewshot_examples: Some(examples),
        ..StateUpdate::new()
            .intent(intent)
            .trace(trace)
            .extra("intention", json!({"fewshot": fewshot_debug}))
    })
}

pub(super) fn matched_query_return(state: &ConversationState) -> StateUpdate {
    StateUpdate::new().trace(format!(
        "**matched_query_return**: {}",
        state.sources.first().map(String::as_str).unwrap_or("-")
    ))
}

pub(super) fn intention_not_ready(ctx: &TurnContext) -> StateUpdate {
    let update = StateUpdate::new().trace("**intention_not_ready**");
    match &ctx.config.intention_config.not_ready_answer {
        Some(answer) => update.answer(answer.clone()),
        None => update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, context_with_store};
    use chatmesh_config::{
        ChatbotConfig, ChatbotMode, DocumentRetrieverConfig, IndexConfig, IntentionRetrieverConfig,
        QuestionRetrieverConfig,
    };
    use chatmesh_store::{InMemoryStore, StoredDocument};
    use std::sync::Arc;

    const QUERY: &str = "how do refunds work";

    /// Unit vector at `score` cosine from [1, 0].
    fn at(score: f32) -> Vec<f32> {
        vec![score, (1.0 - score * score).sqrt()]
    }

    fn faq(question: &str, answer: &str, score: f32) -> StoredDocument {
        StoredDocument::new(
            question,
            json!({"file_path": format!("{question}.faq"), "jsonlAnswer": {"question": question, "answer": answer}}),
        )
        .with_vector("vector_field", at(score))
    }

    fn config() -> ChatbotConfig {
        let mut config = ChatbotConfig {
            chatbot_mode: ChatbotMode::Agent,
            ..ChatbotConfig::default()
        };
        config.qq_match_config.retrievers = vec![QuestionRetrieverConfig {
            index: IndexConfig::new("faq"),
            top_k: 5,
        }];
        config.intention_config.retrievers = vec![IntentionRetrieverConfig {
            index: IndexConfig::new("intents"),
            top_k: 5,
        }];
        config.private_knowledge_config.retrievers = vec![DocumentRetrieverConfig::new("docs")];
        config
    }

    async fn store(docs: Vec<(&str, StoredDocument)>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (index, doc) in docs {
            store.add(index, doc).await;
        }
        store
    }

    fn provider() -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider::new(Vec::new()))
    }

    #[tokio::test]
    async fn strong_match_short_circuits() {
        let store = store(vec![
            ("faq", faq("refund policy?", "Refunds take 5 days.", 0.95)),
            ("faq", faq("shipping?", "2 days.", 0.3)),
        ])
        .await;
        let ctx = context_with_store(config(), provider(), store.clone()).await;

        let update = intention_detection(&ctx, &ConversationState::new(QUERY, Vec::new())).await.unwrap();
        assert_eq!(update.intent_type, Some(IntentType::SimilarQueryFound));
        assert_eq!(update.answer.as_deref(), Some("Refunds take 5 days."));
        assert_eq!(update.sources, vec!["refund policy?.faq"]);
        // question index only; no intention or knowledge lookups
        assert_eq!(store.search_count(), 1);
    }

    #[tokio::test]
    async fn weaker_match_becomes_context() {
        let mut config = config();
        config.qq_match_config.qq_match_threshold = 0.7;
        let store = store(vec![("faq", faq("refund policy?", "5 days.", 0.6))]).await;
        let ctx = context_with_store(config, provider(), store).await;

        let update = intention_detection(&ctx, &ConversationState::new(QUERY, Vec::new())).await.unwrap();
        assert_eq!(update.intent_type, Some(IntentType::IntentionDetected));
        assert_eq!(update.qq_match_results.len(), 1);
        assert_eq!(update.qq_match_results[0].content, "问题: refund policy?, \n答案：5 days.");
    }

    #[tokio::test]
    async fn fewshot_examples_take_precedence_over_knowledge() {
        let store = store(vec![
            (
                "intents",
                StoredDocument::new(QUERY, json!({"intent": "order-status", "kwargs": {"order_id": "A1"}}))
                    .with_vector("vector_field", at(0.9)),
            ),
            (
                "docs",
                StoredDocument::new("Refunds take 5 days.", json!({"file_path": "refund.md"}))
                    .with_vector("vector_field", at(0.9)),
            ),
        ])
        .await;
        let ctx = context_with_store(config(), provider(), store).await;

        let update = intention_detection(&ctx, &ConversationState::new(QUERY, Vec::new())).await.unwrap();
        let examples = update.fewshot_examples.unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].intent, "order_status");
        assert_eq!(examples[0].kwargs["order_id"], "A1");
        assert!(update.contexts.is_empty());
    }

    #[tokio::test]
    async fn knowledge_used_without_examples() {
        let store = store(vec![
            (
                "docs",
                StoredDocument::new("Refunds take 5 days.", json!({"file_path": "refund.md"}))
                    .with_vector("vector_field", at(0.7)),
            ),
            (
                "docs",
                StoredDocument::new("Unrelated.", json!({"file_path": "other.md"})).with_vector("vector_field", at(0.2)),
            ),
        ])
        .await;
        let ctx = context_with_store(config(), provider(), store).await;

        let update = intention_detection(&ctx, &ConversationState::new(QUERY, Vec::new())).await.unwrap();
        assert_eq!(update.contexts.len(), 1);
        assert_eq!(update.contexts[0].content, "Refunds take 5 days.");
        assert_eq!(update.sources, vec!["refund.md"]);
        assert_eq!(update.intent_type, Some(IntentType::IntentionDetected));
    }

    #[tokio::test]
    async fn nothing_found_with_not_ready_answer() {
        let mut config = config();
        config.intention_config.not_ready_answer = Some("Not available yet.".into());
        let ctx = context_with_store(config, provider(), store(Vec::new()).await).await;

        let update = intention_detection(&ctx, &ConversationState::new(QUERY, Vec::new())).await.unwrap();
        assert_eq!(update.intent_type, Some(IntentType::IntentionNotReady));
        assert_eq!(intention_not_ready(&ctx).answer.as_deref(), Some("Not available yet."));
    }

    #[tokio::test]
    async fn only_rag_tool_skips_intentions() {
        let mut config = config();
        config.agent_config.only_use_rag_tool = true;
        let store = store(Vec::new()).await;
        let ctx = context_with_store(config, provider(), store.clone()).await;

        let update = intention_detection(&ctx, &ConversationState::new(QUERY, Vec::new())).await.unwrap();
        assert_eq!(update.intent_type, Some(IntentType::IntentionDetected));
        assert!(update.fewshot_examples.is_none());
        assert_eq!(store.search_count(), 1);
    }
}
