//! End-to-end turns through the graph with scripted models and an
//! in-memory store.

mod common;

use chatmesh_config::AgentToolSpec;
use chatmesh_core::message::Role;
use chatmesh_core::{CancelHandle, CancelToken, EventBus, TurnEvent};
use chatmesh_graph::{FAILURE_ANSWER, IntentType, TurnInput};
use common::*;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn strong_faq_match_answers_without_tools() {
    let store = store_with(vec![
        ("faq", faq_entry("How long do refunds take?", "Refunds take 5 business days.", 0.95)),
        ("faq", faq_entry("Do you ship abroad?", "Yes.", 0.2)),
    ])
    .await;
    let provider = Arc::new(SequentialMockProvider::new(Vec::new()));

    let output = runner(provider.clone(), store)
        .run(TurnInput::new("refund time?", agent_config()), CancelToken::never())
        .await;

    assert!(output.error.is_none(), "{:?}", output.error);
    assert_eq!(output.intent_type, Some(IntentType::SimilarQueryFound));
    assert_eq!(output.answer, "Refunds take 5 business days.");
    assert_eq!(output.sources, vec!["faq/How long do refunds take?"]);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn only_rag_tool_returns_artifact() {
    let store = store_with(vec![
        ("faq", faq_entry("Do you ship abroad?", "Yes.", 0.3)),
        ("docs", doc_chunk("Refunds are issued within 5 days.", "refund.md", "$1-1", 0.8)),
    ])
    .await;
    let mut config = agent_config();
    config.agent_config.only_use_rag_tool = true;
    let provider = Arc::new(SequentialMockProvider::new(Vec::new()));

    let output = runner(provider.clone(), store)
        .run(TurnInput::new("refund time?", config), CancelToken::never())
        .await;

    assert!(output.error.is_none(), "{:?}", output.error);
    assert_eq!(output.intent_type, Some(IntentType::IntentionDetected));
    assert_eq!(output.answer, "Refunds are issued within 5 days.");
    assert_eq!(output.sources, vec!["refund.md"]);
    // forced call, no completion needed
    assert_eq!(provider.call_count(), 0);
    assert!(output.trace.iter().any(|t| t.contains("forced `all_knowledge_rag_tool`")));
}

#[tokio::test]
async fn completion_without_tool_calls_is_the_answer() {
    let store = store_with(Vec::new()).await;
    let provider = Arc::new(SequentialMockProvider::single_text(
        "<thinking>\nThe user greets me.\n</thinking>\nHello! How can I help?",
    ));

    let output = runner(provider.clone(), store)
        .run(TurnInput::new("hello", agent_config()), CancelToken::never())
        .await;

    assert!(output.error.is_none(), "{:?}", output.error);
    assert_eq!(output.answer, "Hello! How can I help?");
    assert_eq!(provider.call_count(), 1);
    assert!(output.trace.iter().any(|t| t.contains("no need tool calling")));
}

#[tokio::test]
async fn failing_tool_call_still_yields_a_message() {
    let store = store_with(Vec::new()).await;
    let mut config = agent_config();
    config.agent_config.tools = vec![AgentToolSpec::Name("echo".into()), AgentToolSpec::Name("boom".into())];
    let provider = Arc::new(SequentialMockProvider::new(vec![
        make_tool_call_response(vec![
            make_tool_call("echo", json!({"text": "first"})),
            make_tool_call("boom", json!({})),
            make_tool_call("echo", json!({"text": "third"})),
        ]),
        make_text_response("Two lookups worked, one failed."),
    ]));

    let output = runner(provider.clone(), store)
        .run(TurnInput::new("do three things", config), CancelToken::never())
        .await;

    assert!(output.error.is_none(), "{:?}", output.error);
    assert_eq!(output.answer, "Two lookups worked, one failed.");

    let second = &provider.requests()[1];
    let tool_messages: Vec<_> = second.messages.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_messages.len(), 3);
    assert_eq!(tool_messages[0].content, "first");
    assert!(tool_messages[1].content.starts_with("Error: "));
    assert!(tool_messages[1].content.contains("backend exploded"));
    assert_eq!(tool_messages[2].content, "third");
    // assistant tool-call message precedes the results
    let assistant = second.messages.iter().position(|m| !m.tool_calls.is_empty()).unwrap();
    let first_tool = second.messages.iter().position(|m| m.role == Role::Tool).unwrap();
    assert!(assistant < first_tool);
}

#[tokio::test]
async fn endless_tool_loop_hits_recursion_limit() {
    let store = store_with(Vec::new()).await;
    let mut config = agent_config();
    config.agent_config.tools = vec![AgentToolSpec::Name("echo".into())];
    let provider = Arc::new(SequentialMockProvider::repeating(make_tool_call_response(vec![make_tool_call(
        "echo",
        json!({"text": "again"}),
    )])));

    let output = runner(provider.clone(), store)
        .run(TurnInput::new("loop forever", config), CancelToken::never())
        .await;

    let error = output.error.expect("turn should fail");
    assert!(error.contains("Recursion limit of 20"), "{error}");
    assert_eq!(output.answer, FAILURE_ANSWER);
    // query_preprocess, intention_detection, then agent/tools pairs: the agent runs 9 times in 20 steps
    assert_eq!(provider.call_count(), 9);
    assert!(output.trace.last().unwrap().starts_with("**error**"));
}

#[tokio::test]
async fn cancelled_turn_reports_cancellation() {
    let store = store_with(Vec::new()).await;
    let provider = Arc::new(SequentialMockProvider::new(Vec::new()));
    let (handle, token) = CancelHandle::new();
    handle.cancel();

    let output = runner(provider.clone(), store)
        .run(TurnInput::new("hi", agent_config()), token)
        .await;

    assert!(output.error.unwrap().contains("cancelled"));
    assert_eq!(output.answer, FAILURE_ANSWER);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn trace_and_stream_events_are_published() {
    let store = store_with(Vec::new()).await;
    let provider = Arc::new(SequentialMockProvider::single_text("Hi!"));
    let events = EventBus::new(64);
    let mut rx = events.subscribe();

    let mut input = TurnInput::new("hello", agent_config());
    input.stream = true;
    let output = runner(provider, store).with_events(events).run(input, CancelToken::never()).await;
    assert_eq!(output.answer, "Hi!");

    let mut traces = 0;
    let mut chunks = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event.as_ref() {
            TurnEvent::Trace { .. } => traces += 1,
            TurnEvent::Chunk { content } => chunks.push(content.clone()),
        }
    }
    assert_eq!(traces, output.trace.len());
    assert_eq!(chunks, vec!["Hi!"]);
}

#[tokio::test]
async fn weak_faq_match_reaches_agent_prompt() {
    let store = store_with(vec![("faq", faq_entry("Do you ship abroad?", "Yes, to 40 countries.", 0.7))]).await;
    let provider = Arc::new(SequentialMockProvider::single_text("We ship to 40 countries."));

    let output = runner(provider.clone(), store)
        .run(TurnInput::new("international shipping?", agent_config()), CancelToken::never())
        .await;

    assert_eq!(output.answer, "We ship to 40 countries.");
    let system = &provider.requests()[0].messages[0];
    assert!(system.content.contains("问题: Do you ship abroad?, \n答案：Yes, to 40 countries."));
}
