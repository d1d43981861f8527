//! # chatmesh core
//!
//! Domain types, traits, and error definitions for the chatmesh dialog
//! orchestration runtime. This crate has **no framework dependencies**: it
//! defines the domain model that the store, retrieval, tool and graph crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (completion model, vectorizer, search index,
//! tool) is a trait here. Implementations live in their respective crates.
//! This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/in-memory implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;
pub mod timeout;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{EventBus, TurnEvent};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice};
pub use store::{DocumentStore, QueryType, SearchFilter, SearchHit, SearchRequest, SearchTerm};
pub use timeout::{CancelHandle, CancelToken, TimeoutConfig};
pub use tool::{RegisteredTool, Scene, Tool, ToolCall, ToolDefinition, ToolRegistry, ToolResult};
