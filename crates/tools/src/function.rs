//! Function tool: an async closure registered as a tool.

use async_trait::async_trait;
use chatmesh_core::error::ToolError;
use chatmesh_core::tool::{Tool, ToolResult};
use futures::future::BoxFuture;
use std::sync::Arc;

type Handler = Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<ToolResult, ToolError>> + Send + Sync>;

pub struct FunctionTool {
    name: String,
    description: String,
    schema: serde_json::Value,
    handler: Handler,
}

impl FunctionTool {
    /// Wrap `handler`. `schema` is the JSON Schema of its arguments object.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, schema: serde_json::Value, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        (self.handler)(arguments).await
    }
}
