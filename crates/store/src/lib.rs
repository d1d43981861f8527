//! Document store backends for chatmesh.
//!
//! All backends implement the `chatmesh_core::DocumentStore` trait.
//! - `opensearch`: OpenSearch-compatible search service over HTTP
//! - `in_memory`: in-process index for tests and local runs
//! - `vector`: cosine similarity used by the in-memory k-NN

pub mod in_memory;
pub mod opensearch;
pub mod vector;

pub use in_memory::{InMemoryStore, StoredDocument};
pub use opensearch::OpenSearchStore;
