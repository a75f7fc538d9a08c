//! ReportQA Common Library
//!
//! Shared code for the ReportQA services including:
//! - Document, chunk and answer data model
//! - Embedding and language model provider abstractions
//! - Per-collection retrieval indexes and the collection registry
//! - The sub-question query pipeline (decompose, route, synthesize)
//! - Error types and handling
//! - Configuration management
//! - Metrics and tracing setup

pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod retrieval;
pub mod telemetry;
pub mod resilience;

// Re-export commonly used types
pub use config::AppConfig;
pub use context::QueryFacade;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::LanguageModel;
pub use retrieval::{CollectionIndex, CollectionRegistry};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Default chat model used for decomposition, answering and synthesis
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

/// Number of chunks retrieved per sub-question
pub const DEFAULT_TOP_K: usize = 3;
