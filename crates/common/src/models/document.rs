//! Documents, pages and chunks
//!
//! Everything here is immutable once ingestion has finished.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// One ingested source document belonging to a single collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub collection_name: String,
    pub source_path: String,
    /// Pages in source order
    pub pages: Vec<Page>,
}

impl Document {
    /// Number of pages carrying any non-whitespace text
    pub fn non_empty_pages(&self) -> usize {
        self.pages.iter().filter(|p| !p.is_blank()).count()
    }
}

/// Text of one source page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based page index
    pub index: usize,
    pub text: String,
}

impl Page {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Stable, content-derived chunk identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(String);

impl ChunkId {
    /// Derive an id from the chunk's collection, position and text.
    ///
    /// Identical input always yields the same id, so ids survive re-ingestion
    /// of an unchanged document.
    pub fn derive(collection: &str, page: usize, offset: usize, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(collection.as_bytes());
        hasher.update([0]);
        hasher.update(page.to_le_bytes());
        hasher.update(offset.to_le_bytes());
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive range of source pages a chunk was cut from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub first: usize,
    pub last: usize,
}

impl PageRange {
    pub fn single(page: usize) -> Self {
        Self {
            first: page,
            last: page,
        }
    }
}

/// A bounded span of document text; the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub collection_name: String,
    pub text: String,
    /// Back-reference to the source document
    pub source_path: String,
    pub pages: PageRange,
    /// Byte offset of the chunk within its page text
    pub offset: usize,
}

impl Chunk {
    /// Build a chunk with an id derived from its content and position
    pub fn new(
        collection_name: impl Into<String>,
        source_path: impl Into<String>,
        page: usize,
        offset: usize,
        text: impl Into<String>,
    ) -> Self {
        let collection_name = collection_name.into();
        let text = text.into();
        Self {
            id: ChunkId::derive(&collection_name, page, offset, &text),
            collection_name,
            text,
            source_path: source_path.into(),
            pages: PageRange::single(page),
            offset,
        }
    }
}

/// Routing metadata for one collection, registered once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub name: String,
    pub description: String,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_stable() {
        let a = ChunkId::derive("fy2021", 0, 0, "total cost: 100");
        let b = ChunkId::derive("fy2021", 0, 0, "total cost: 100");
        let c = ChunkId::derive("fy2022", 0, 0, "total cost: 100");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 24);
    }

    #[test]
    fn test_non_empty_pages() {
        let doc = Document {
            collection_name: "fy2021".into(),
            source_path: "reports/fy2021.txt".into(),
            pages: vec![Page::new(0, "Revenue"), Page::new(1, "  \n "), Page::new(2, "Costs")],
        };
        assert_eq!(doc.non_empty_pages(), 2);
    }
}
