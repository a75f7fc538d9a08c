//! ReportQA Ingestion
//!
//! Turns configured source documents into searchable collections:
//! 1. Extracts ordered page text from PDF or plain-text sources
//! 2. Splits pages into chunks
//! 3. Embeds the chunks into one index per collection
//! 4. Registers the indexes in configuration order

pub mod chunker;
pub mod errors;
pub mod pdf;
pub mod pipeline;
pub mod store;

pub use chunker::{ChunkingPolicy, DocumentChunks};
pub use errors::IngestionError;
pub use pipeline::{build_registry, ingest_collections, IngestedCollection};
pub use store::DocumentStore;
