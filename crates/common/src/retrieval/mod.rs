//! Per-collection semantic retrieval
//!
//! Provides:
//! - `CollectionIndex`: embedded chunks of one collection with top-k cosine search
//! - `CollectionRegistry`: name-keyed, registration-ordered set of indexes
//!
//! Both are built once at startup and only read afterwards.

mod index;
mod registry;

pub use index::{CollectionIndex, IndexBuildOptions, ScoredChunk};
pub use registry::CollectionRegistry;
