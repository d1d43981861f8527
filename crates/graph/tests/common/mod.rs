//! Shared fixtures for the turn scenarios.

#![allow(dead_code)]

use async_trait::async_trait;
use chatmesh_config::{ChatbotConfig, ChatbotMode, DocumentRetrieverConfig, IndexConfig, QuestionRetrieverConfig};
use chatmesh_core::error::{ProviderError, ToolError};
use chatmesh_core::provider::{EmbeddingRequest, EmbeddingResponse, Usage};
use chatmesh_core::{Message, MessageToolCall, Provider, ProviderRequest, ProviderResponse, Scene, ToolRegistry, ToolResult};
use chatmesh_graph::TurnRunner;
use chatmesh_store::{InMemoryStore, StoredDocument};
use chatmesh_tools::FunctionTool;
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Returns scripted responses in order; the last one repeats when
/// `repeat_last` is set. Embeds every text as `[1, 0]`.
pub struct SequentialMockProvider {
    responses: Vec<ProviderResponse>,
    repeat_last: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses,
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn repeating(response: ProviderResponse) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![response])
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);

        let response = match self.responses.get(index) {
            Some(response) => response,
            None if self.repeat_last => self.responses.last().expect("at least one scripted response"),
            None => panic!(
                "SequentialMockProvider: no more responses (call #{index}, have {})",
                self.responses.len()
            ),
        };
        Ok(response.clone())
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|_| vec![1.0, 0.0]).collect(),
            model: request.model,
        })
    }
}

fn response(message: Message) -> ProviderResponse {
    ProviderResponse {
        message,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    response(Message::assistant(text))
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    response(Message::assistant_tool_calls("", tool_calls))
}

pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall::new(name, &args)
}

/// Unit vector whose cosine with `[1, 0]` is `score`.
pub fn at(score: f32) -> Vec<f32> {
    vec![score, (1.0 - score * score).sqrt()]
}

pub fn faq_entry(question: &str, answer: &str, score: f32) -> StoredDocument {
    StoredDocument::new(
        question,
        json!({
            "file_path": format!("faq/{question}"),
            "jsonlAnswer": {"question": question, "answer": answer}
        }),
    )
    .with_vector("vector_field", at(score))
}

pub fn doc_chunk(text: &str, file_path: &str, chunk_id: &str, score: f32) -> StoredDocument {
    StoredDocument::new(
        text,
        json!({"file_path": file_path, "chunk_id": chunk_id, "content_type": "paragraph"}),
    )
    .with_vector("vector_field", at(score))
}

/// Agent-mode config over a `faq` question index and a `docs` knowledge index.
pub fn agent_config() -> ChatbotConfig {
    let mut config = ChatbotConfig {
        chatbot_mode: ChatbotMode::Agent,
        ..ChatbotConfig::default()
    };
    config.qq_match_config.retrievers = vec![QuestionRetrieverConfig {
        index: IndexConfig::new("faq"),
        top_k: 5,
    }];
    config.private_knowledge_config.retrievers = vec![DocumentRetrieverConfig::new("docs")];
    config
}

pub async fn store_with(docs: Vec<(&str, StoredDocument)>) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for (index, doc) in docs {
        store.add(index, doc).await;
    }
    store
}

/// A registry with `echo` (returns `text`) and `boom` (always fails).
pub fn tool_registry() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    let echo = FunctionTool::new(
        "echo",
        "Echo the text back",
        json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]}),
        |args| async move { Ok(ToolResult::text(args["text"].as_str().unwrap_or_default().to_string())) },
    );
    let boom = FunctionTool::new("boom", "Always fails", json!({"type": "object"}), |_| async move {
        Err(ToolError::ExecutionFailed {
            tool_name: "boom".into(),
            reason: "backend exploded".into(),
        })
    });
    registry.register_tool(Scene::Common, Arc::new(echo), false).unwrap();
    registry.register_tool(Scene::Common, Arc::new(boom), false).unwrap();
    Arc::new(registry)
}

pub fn runner(provider: Arc<SequentialMockProvider>, store: Arc<InMemoryStore>) -> TurnRunner {
    TurnRunner::new(provider, store).with_registry(tool_registry())
}
