//! Tool implementations for chatmesh.
//!
//! Tools give the agent its capabilities:
//! - [`RagTool`] answers from the private knowledge indexes
//! - [`FunctionTool`] wraps an in-process async function
//! - [`HttpEndpointTool`] calls an external service over HTTP
//!
//! [`register_from_config`] registers everything a chatbot config declares.

pub mod function;
pub mod http_endpoint;
pub mod rag;
pub mod setup;

pub use function::FunctionTool;
pub use http_endpoint::HttpEndpointTool;
pub use rag::{RagGeneration, RagTool};
pub use setup::{ALL_KNOWLEDGE_RAG_TOOL, RegisteredTools, ToolContext, register_from_config};
