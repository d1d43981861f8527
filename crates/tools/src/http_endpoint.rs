//! HTTP endpoint tool: POSTs the call arguments as JSON to a configured URL.
//!
//! A 2xx response body becomes the tool output (and, if it parses, the
//! structured data). Anything else is an execution failure.

use async_trait::async_trait;
use chatmesh_config::EndpointToolConfig;
use chatmesh_core::error::ToolError;
use chatmesh_core::tool::{Tool, ToolResult};
use tracing::{debug, warn};

pub struct HttpEndpointTool {
    config: EndpointToolConfig,
    client: reqwest::Client,
}

impl HttpEndpointTool {
    pub fn new(config: EndpointToolConfig) -> Result<Self, ToolError> {
        if !config.url.starts_with("http://") && !config.url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(format!(
                "endpoint tool '{}': URL must start with http:// or https://",
                config.name
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: config.name.clone(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self { config, client })
    }

    fn failure(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.config.name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for HttpEndpointTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.config.parameters_schema()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        for field in &self.config.required {
            if arguments.get(field).is_none() {
                return Err(ToolError::InvalidArguments(format!("Missing '{field}' argument")));
            }
        }

        debug!(tool = %self.config.name, url = %self.config.url, "Calling endpoint tool");

        let response = self
            .client
            .post(&self.config.url)
            .json(&arguments)
            .send()
            .await
            .map_err(|e| self.failure(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.failure(e.to_string()))?;

        if !status.is_success() {
            warn!(tool = %self.config.name, status = status.as_u16(), "Endpoint tool returned error");
            return Err(self.failure(format!("HTTP {}: {body}", status.as_u16())));
        }

        let data = serde_json::from_str(&body).ok();
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: body,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(url: &str) -> EndpointToolConfig {
        EndpointToolConfig {
            name: "order_status".into(),
            description: "Look up an order".into(),
            url: url.into(),
            properties: serde_json::from_value(json!({"order_id": {"type": "string"}})).unwrap(),
            required: vec!["order_id".into()],
            return_direct: false,
        }
    }

    /// Serve one request, answering with `status` and `body`.
    async fn one_shot_server(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| l.to_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap()))
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/tool")
    }

    #[tokio::test]
    async fn posts_arguments_and_returns_body() {
        let url = one_shot_server("200 OK", r#"{"status":"shipped"}"#).await;
        let tool = HttpEndpointTool::new(config(&url)).unwrap();
        let result = tool.execute(json!({"order_id": "A1"})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, r#"{"status":"shipped"}"#);
        assert_eq!(result.data.unwrap()["status"], "shipped");
    }

    #[tokio::test]
    async fn error_status_is_execution_failure() {
        let url = one_shot_server("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let tool = HttpEndpointTool::new(config(&url)).unwrap();
        let err = tool.execute(json!({"order_id": "A1"})).await.unwrap_err();
        match err {
            ToolError::ExecutionFailed { tool_name, reason } => {
                assert_eq!(tool_name, "order_status");
                assert!(reason.contains("500"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_required_argument() {
        let tool = HttpEndpointTool::new(config("http://127.0.0.1:1/tool")).unwrap();
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails() {
        let tool = HttpEndpointTool::new(config("http://127.0.0.1:1/tool")).unwrap();
        let err = tool.execute(json!({"order_id": "A1"})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpEndpointTool::new(config("ftp://example.com")).is_err());
    }

    #[test]
    fn schema_from_config() {
        let tool = HttpEndpointTool::new(config("https://example.com/x")).unwrap();
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"][0], "order_id");
        assert_eq!(schema["properties"]["order_id"]["type"], "string");
    }
}
