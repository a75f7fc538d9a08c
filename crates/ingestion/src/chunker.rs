//! Page chunking
//!
//! Splits document pages into overlapping chunks for embedding. Chunks never
//! span pages, so every chunk maps back to exactly one source page.

use reportqa_common::config::IngestionConfig;
use reportqa_common::models::{Chunk, Document};
use std::collections::VecDeque;
use text_splitter::{ChunkConfig, MarkdownSplitter, TextSplitter};
use tracing::trace;

use crate::errors::IngestionError;

/// How pages are cut into chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingPolicy {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    chunk_overlap: usize,
    /// Shorter fragments are merged into the chunk before them
    min_chunk_size: usize,
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 100,
        }
    }
}

impl ChunkingPolicy {
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> Result<Self, IngestionError> {
        // Let the splitter reject impossible combinations up front
        ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| IngestionError::ChunkingError(e.to_string()))?;

        Ok(Self {
            chunk_size,
            chunk_overlap,
            min_chunk_size,
        })
    }

    pub fn from_config(config: &IngestionConfig) -> Result<Self, IngestionError> {
        Self::new(config.chunk_size, config.chunk_overlap, config.min_chunk_size)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn splitter_config(&self) -> ChunkConfig<text_splitter::Characters> {
        ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .unwrap_or_else(|_| ChunkConfig::new(self.chunk_size))
    }

    /// Split one page into `(byte offset, text)` spans
    fn split_page(&self, text: &str, markdown: bool) -> Vec<(usize, String)> {
        let spans: Vec<(usize, String)> = if markdown {
            MarkdownSplitter::new(self.splitter_config())
                .chunk_indices(text)
                .map(|(offset, span)| (offset, span.to_string()))
                .collect()
        } else {
            TextSplitter::new(self.splitter_config())
                .chunk_indices(text)
                .map(|(offset, span)| (offset, span.to_string()))
                .collect()
        };

        // Short fragments join the previous chunk so no page text goes unindexed
        let mut kept: Vec<(usize, String)> = Vec::with_capacity(spans.len());
        for (offset, span) in spans {
            if span.trim().is_empty() {
                continue;
            }
            let end = offset + span.len();
            let previous = kept
                .last()
                .filter(|_| span.len() < self.min_chunk_size)
                .map(|(start, previous)| (*start, *start + previous.len()));

            if let Some((start, covered_until)) = previous {
                if end <= covered_until {
                    continue;
                }
                if let (Some(merged), Some(last)) = (text.get(start..end), kept.last_mut()) {
                    last.1 = merged.to_string();
                    continue;
                }
            }
            kept.push((offset, span));
        }
        kept
    }
}

/// Lazy chunk sequence over one document.
///
/// Pages are split on demand. A clone continues from the same position;
/// a fresh [`DocumentChunks::new`] starts again from the first page.
#[derive(Debug, Clone)]
pub struct DocumentChunks<'a> {
    document: &'a Document,
    policy: ChunkingPolicy,
    markdown: bool,
    next_page: usize,
    pending: VecDeque<Chunk>,
}

impl<'a> DocumentChunks<'a> {
    pub fn new(document: &'a Document, policy: &ChunkingPolicy) -> Self {
        Self {
            document,
            policy: policy.clone(),
            markdown: is_markdown(&document.source_path),
            next_page: 0,
            pending: VecDeque::new(),
        }
    }
}

impl Iterator for DocumentChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let document = self.document;
        while self.pending.is_empty() {
            let page = document.pages.get(self.next_page)?;
            self.next_page += 1;

            if page.is_blank() {
                continue;
            }

            let spans = self.policy.split_page(&page.text, self.markdown);
            trace!(page = page.index, chunks = spans.len(), "Page chunked");

            self.pending.extend(spans.into_iter().map(|(offset, text)| {
                Chunk::new(
                    &document.collection_name,
                    &document.source_path,
                    page.index,
                    offset,
                    text,
                )
            }));
        }
        self.pending.pop_front()
    }
}

fn is_markdown(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md"))
}
