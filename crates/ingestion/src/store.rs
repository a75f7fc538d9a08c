//! Document loading
//!
//! PDF sources go through lopdf page by page. Plain-text and markdown
//! sources are read whole and split into pages on form feeds.

use reportqa_common::models::{Document, Page};
use std::path::Path;
use tracing::{debug, instrument};

use crate::chunker::{ChunkingPolicy, DocumentChunks};
use crate::errors::IngestionError;
use crate::pdf;

const PAGE_BREAK: char = '\u{000C}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Pdf,
    Text,
}

impl SourceFormat {
    fn detect(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(SourceFormat::Pdf),
            "txt" | "md" => Some(SourceFormat::Text),
            _ => None,
        }
    }
}

/// Loads source documents and chunks them
#[derive(Debug, Clone, Default)]
pub struct DocumentStore;

impl DocumentStore {
    pub fn new() -> Self {
        Self
    }

    /// Read `source_path` into a document of ordered pages.
    ///
    /// Missing, unreadable, unsupported or text-free sources are errors.
    #[instrument(skip(self, source_path), fields(path = %source_path.as_ref().display()))]
    pub fn load(&self, collection_name: &str, source_path: impl AsRef<Path>) -> Result<Document, IngestionError> {
        let path = source_path.as_ref();
        let display = path.display().to_string();

        if !path.is_file() {
            return Err(IngestionError::FileNotFound(display));
        }

        let format = SourceFormat::detect(path)
            .ok_or_else(|| IngestionError::UnsupportedFormat { path: display.clone() })?;

        let pages = match format {
            SourceFormat::Pdf => pdf::extract_pages(path)?,
            SourceFormat::Text => split_text_pages(&std::fs::read_to_string(path)?),
        };

        let document = Document {
            collection_name: collection_name.to_string(),
            source_path: display.clone(),
            pages,
        };

        if document.non_empty_pages() == 0 {
            return Err(IngestionError::EmptySource { path: display });
        }

        debug!(
            collection = collection_name,
            pages = document.pages.len(),
            non_empty = document.non_empty_pages(),
            "Document loaded"
        );
        Ok(document)
    }

    /// Lazily chunk a loaded document
    pub fn chunk<'a>(&self, document: &'a Document, policy: &ChunkingPolicy) -> DocumentChunks<'a> {
        DocumentChunks::new(document, policy)
    }
}

fn split_text_pages(text: &str) -> Vec<Page> {
    text.split(PAGE_BREAK)
        .enumerate()
        .map(|(index, page)| Page::new(index, page.trim()))
        .collect()
}
