//! Per-turn tool registration from a chatbot config.

use chatmesh_config::{AgentToolSpec, ChatbotConfig, DocumentRetrieverConfig, ModelTable};
use chatmesh_core::error::ToolError;
use chatmesh_core::provider::Provider;
use chatmesh_core::tool::{Scene, ToolDefinition, ToolRegistry, normalize_tool_name};
use chatmesh_retrieval::{Backends, DocumentRetriever, Retriever};
use std::sync::Arc;
use tracing::info;

use crate::http_endpoint::HttpEndpointTool;
use crate::rag::{RagGeneration, RagTool};

/// Name of the RAG tool spanning every private-knowledge index.
pub const ALL_KNOWLEDGE_RAG_TOOL: &str = "all_knowledge_rag_tool";

const ALL_KNOWLEDGE_DESCRIPTION: &str = "all knowledge rag tool";

/// Services the registered tools call into.
#[derive(Clone)]
pub struct ToolContext {
    pub backends: Backends,
    pub provider: Arc<dyn Provider>,
    pub models: ModelTable,
    pub default_model: String,
}

/// What registration produced.
#[derive(Debug, Clone)]
pub struct RegisteredTools {
    /// Tools the agent may be offered, in config order
    pub agent_tools: Vec<String>,
    pub all_knowledge: ToolDefinition,
}

fn rag_tool(name: &str, description: &str, retrievers: &[DocumentRetrieverConfig], config: &ChatbotConfig, ctx: &ToolContext) -> RagTool {
    let retrievers: Vec<Arc<dyn Retriever>> = retrievers
        .iter()
        .map(|r| Arc::new(DocumentRetriever::new(r.clone(), ctx.backends.clone())) as Arc<dyn Retriever>)
        .collect();

    let tool = RagTool::new(name, description, retrievers);
    match &config.private_knowledge_config.llm_config {
        Some(llm) => tool.with_generation(RagGeneration {
            provider: ctx.provider.clone(),
            model: ctx.models.resolve(llm.model_id_or(&ctx.default_model)),
            kwargs: llm.model_kwargs.clone(),
            system_prompt: config.prompts.rag_system_prompt.clone(),
            timeout: ctx.backends.timeouts.completion(),
        }),
        None => tool,
    }
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !names.contains(&name) {
        names.push(name);
    }
}

/// Register every tool `config` declares into `registry`.
///
/// - one returns-direct RAG tool per private-knowledge index with a description
/// - endpoint tools from `agent_config.tools`
/// - the returns-direct [`ALL_KNOWLEDGE_RAG_TOOL`]
pub fn register_from_config(
    registry: &ToolRegistry,
    config: &ChatbotConfig,
    ctx: &ToolContext,
) -> Result<RegisteredTools, ToolError> {
    let mut agent_tools = Vec::new();

    for retriever in &config.private_knowledge_config.retrievers {
        let Some(description) = &retriever.index.description else {
            continue;
        };
        let tool = rag_tool(&retriever.index.index_name, description, std::slice::from_ref(retriever), config, ctx);
        let def = registry.register(Scene::Common, &retriever.index.index_name, Arc::new(tool), description.clone(), true)?;
        info!(tool = %def.name, description = %def.description, "Registered RAG tool");
        push_unique(&mut agent_tools, def.name);
    }

    for spec in &config.agent_config.tools {
        match spec {
            AgentToolSpec::Name(name) => push_unique(&mut agent_tools, normalize_tool_name(name)),
            AgentToolSpec::Endpoint(endpoint) => {
                let tool = HttpEndpointTool::new(endpoint.clone())?;
                let def = registry.register(
                    Scene::Common,
                    &endpoint.name,
                    Arc::new(tool),
                    endpoint.description.clone(),
                    endpoint.return_direct,
                )?;
                info!(tool = %def.name, url = %endpoint.url, "Registered endpoint tool");
                push_unique(&mut agent_tools, def.name);
            }
        }
    }

    let all_knowledge = rag_tool(
        ALL_KNOWLEDGE_RAG_TOOL,
        ALL_KNOWLEDGE_DESCRIPTION,
        &config.private_knowledge_config.retrievers,
        config,
        ctx,
    );
    let all_knowledge = registry.register(
        Scene::Common,
        ALL_KNOWLEDGE_RAG_TOOL,
        Arc::new(all_knowledge),
        ALL_KNOWLEDGE_DESCRIPTION,
        true,
    )?;

    Ok(RegisteredTools {
        agent_tools,
        all_knowledge,
    })
}
