//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool is either retrieval-backed (a "RAG tool") or an arbitrary external
//! function. Tools live in a [`ToolRegistry`], keyed by scene and name, and
//! are handed to the completion model as [`ToolDefinition`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ToolError;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content (shown to the model on the next completion)
    pub output: String,

    /// Optional structured data; RAG tools put `{artifact, sources}` here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// A successful plain-text result.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// A successful result carrying a separate artifact and its sources.
    pub fn with_artifact(output: impl Into<String>, artifact: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: Some(serde_json::json!({
                "artifact": artifact.into(),
                "sources": sources,
            })),
        }
    }

    /// The artifact, if the tool produced one.
    pub fn artifact(&self) -> Option<&str> {
        self.data.as_ref()?.get("artifact")?.as_str()
    }

    /// Source paths attached to the artifact.
    pub fn sources(&self) -> Vec<String> {
        self.data
            .as_ref()
            .and_then(|d| d.get("sources"))
            .and_then(|s| s.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }
}

/// The core Tool trait.
///
/// Implemented by the RAG tool, function tools and HTTP endpoint tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The default name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The registered (normalized) tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,

    /// Whether the tool's result ends the agent loop as the final answer
    #[serde(default)]
    pub returns_direct: bool,
}

/// The scene a tool is registered under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scene {
    #[default]
    Common,
    Custom(String),
}

/// Replace `-` with `_` so index ids become valid function names.
pub fn normalize_tool_name(name: &str) -> String {
    name.replace('-', "_")
}

/// A registered tool: its definition plus the capability behind it.
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    capability: Arc<dyn Tool>,
}

impl RegisteredTool {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn returns_direct(&self) -> bool {
        self.definition.returns_direct
    }

    /// Invoke the capability, stamping the call id on the result.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let mut result = self.capability.execute(call.arguments.clone()).await?;
        result.call_id = call.id.clone();
        Ok(result)
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("definition", &self.definition)
            .finish()
    }
}

/// A registry of available tools.
///
/// Registration is race-free: the map sits behind a `RwLock`, so one
/// registry can be shared by `Arc` across concurrently configured turns.
/// Reads dominate after a turn's setup phase.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<(Scene, String), RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under `name`.
    ///
    /// The name is normalized (`-` → `_`); collisions fail with
    /// [`ToolError::Duplicate`]. Returns the stored definition.
    pub fn register(
        &self,
        scene: Scene,
        name: &str,
        capability: Arc<dyn Tool>,
        description: impl Into<String>,
        returns_direct: bool,
    ) -> std::result::Result<ToolDefinition, ToolError> {
        let name = normalize_tool_name(name);
        let definition = ToolDefinition {
            name: name.clone(),
            description: description.into(),
            parameters: capability.parameters_schema(),
            returns_direct,
        };

        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        let key = (scene, name);
        if tools.contains_key(&key) {
            return Err(ToolError::Duplicate(key.1));
        }
        tools.insert(
            key,
            RegisteredTool {
                definition: definition.clone(),
                capability,
            },
        );
        Ok(definition)
    }

    /// Register a capability under its own name and description.
    pub fn register_tool(
        &self,
        scene: Scene,
        capability: Arc<dyn Tool>,
        returns_direct: bool,
    ) -> std::result::Result<ToolDefinition, ToolError> {
        let name = capability.name().to_string();
        let description = capability.description().to_string();
        self.register(scene, &name, capability, description, returns_direct)
    }

    /// Get a tool by scene and registered name.
    pub fn get(&self, scene: &Scene, name: &str) -> std::result::Result<RegisteredTool, ToolError> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools
            .get(&(scene.clone(), name.to_string()))
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Whether a tool is registered.
    pub fn contains(&self, scene: &Scene, name: &str) -> bool {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.contains_key(&(scene.clone(), name.to_string()))
    }

    /// Execute a tool call.
    pub async fn execute(&self, scene: &Scene, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self.get(scene, &call.name)?;
        tool.execute(call).await
    }

    /// All tool definitions in a scene, sorted by name.
    pub fn definitions(&self, scene: &Scene) -> Vec<ToolDefinition> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        let mut defs: Vec<ToolDefinition> = tools
            .iter()
            .filter(|((s, _), _)| s == scene)
            .map(|(_, t)| t.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Registered names in a scene, sorted.
    pub fn names(&self, scene: &Scene) -> Vec<String> {
        self.definitions(scene).into_iter().map(|d| d.name).collect()
    }

    /// A new registry seeded with every entry of this one.
    ///
    /// Used to give each turn its own registration space on top of the
    /// process-wide tools, so per-turn tools never collide across turns.
    pub fn scoped(&self) -> ToolRegistry {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        ToolRegistry {
            tools: RwLock::new(tools.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
