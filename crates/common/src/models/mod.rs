//! Data model shared by ingestion, retrieval and the query pipeline

mod answer;
mod document;

pub use answer::{FinalAnswer, SubAnswer, SubAnswerStatus, SubQuestion};
pub use document::{Chunk, ChunkId, CollectionDescriptor, Document, Page, PageRange};
