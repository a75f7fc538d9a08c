//! In-memory vector index for one collection

use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::embeddings::{cosine_similarity, Embedder};
use crate::errors::{AppError, Result};
use crate::models::Chunk;
use crate::resilience::bounded;

/// Controls how embeddings are computed while building an index
#[derive(Debug, Clone)]
pub struct IndexBuildOptions {
    /// Chunks per embedding request
    pub batch_size: usize,
    /// Embedding requests in flight at once
    pub concurrency: usize,
    /// Budget for each embedding request
    pub timeout: Duration,
}

impl Default for IndexBuildOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            concurrency: 4,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A chunk with its relevance score for one query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// Retrieval index over the chunks of a single collection
pub struct CollectionIndex {
    name: String,
    entries: Vec<IndexedChunk>,
    embedder: Arc<dyn Embedder>,
    query_timeout: Duration,
}

impl std::fmt::Debug for CollectionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionIndex")
            .field("name", &self.name)
            .field("chunks", &self.entries.len())
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

impl CollectionIndex {
    /// Embed `chunks` and build the index for collection `name`.
    ///
    /// Every chunk must belong to `name`. Embedding batches run concurrently
    /// up to `options.concurrency`; any provider failure or malformed vector
    /// fails the whole build with `EmbeddingError` (or `ProviderTimeout`).
    #[instrument(skip(chunks, embedder, options), fields(collection = %name, chunks = chunks.len()))]
    pub async fn build(
        name: &str,
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        options: &IndexBuildOptions,
    ) -> Result<Self> {
        if let Some(stray) = chunks.iter().find(|c| c.collection_name != name) {
            return Err(AppError::invalid_argument(format!(
                "chunk {} belongs to collection '{}', not '{}'",
                stray.id, stray.collection_name, name
            )));
        }

        let dimension = embedder.dimension();
        let batch_size = options.batch_size.max(1);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        // `buffered` keeps batch order, so vectors line up with `chunks`
        let batches: Vec<Vec<Vec<f32>>> = futures::stream::iter(texts.chunks(batch_size))
            .map(|batch| {
                let embedder = embedder.clone();
                async move {
                    let vectors =
                        bounded("embedding", options.timeout, embedder.embed_batch(batch)).await?;
                    crate::embeddings::validate_embeddings(batch.len(), dimension, vectors)
                }
            })
            .buffered(options.concurrency.max(1))
            .try_collect()
            .await?;

        let entries: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(batches.into_iter().flatten())
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        debug!(indexed = entries.len(), "Collection index built");

        Ok(Self {
            name: name.to_string(),
            entries,
            embedder,
            query_timeout: options.timeout,
        })
    }

    /// Collection this index serves
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` chunks ranked by descending cosine similarity to `text`.
    ///
    /// `k` must be positive. An empty index answers with no results without
    /// contacting the embedding provider.
    #[instrument(skip(self, text), fields(collection = %self.name))]
    pub async fn query(&self, text: &str, k: i64) -> Result<Vec<ScoredChunk>> {
        if k <= 0 {
            return Err(AppError::invalid_argument(format!(
                "k must be a positive integer, got {}",
                k
            )));
        }

        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector =
            bounded("embedding", self.query_timeout, self.embedder.embed(text)).await?;
        if query_vector.len() != self.embedder.dimension() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "query vector has dimension {}, expected {}",
                    query_vector.len(),
                    self.embedder.dimension()
                ),
            });
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&query_vector, &entry.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(usize::try_from(k).unwrap_or(usize::MAX));

        debug!(returned = scored.len(), "Collection queried");
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;
    use async_trait::async_trait;

    fn chunk(collection: &str, page: usize, text: &str) -> Chunk {
        Chunk::new(collection, format!("reports/{}.txt", collection), page, 0, text)
    }

    async fn index_of(collection: &str, texts: &[&str]) -> CollectionIndex {
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| chunk(collection, i, t))
            .collect();
        CollectionIndex::build(
            collection,
            chunks,
            Arc::new(MockEmbedder::new(128)),
            &IndexBuildOptions::default(),
        )
        .await
        .unwrap()
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::EmbeddingError { message: "unreachable".into() })
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            // One short vector per input: malformed dimension
            Ok(texts.iter().map(|_| vec![0.5]).collect())
        }

        fn model_name(&self) -> &str {
            "broken"
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    #[tokio::test]
    async fn test_rejects_non_positive_k() {
        let index = index_of("fy2021", &["total cost: 100"]).await;
        for k in [0, -1] {
            assert!(matches!(
                index.query("total cost", k).await,
                Err(AppError::InvalidArgument { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_k_larger_than_index() {
        let index = index_of("fy2021", &["total cost: 100"]).await;
        let results = index.query("total cost", 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "total cost: 100");
    }

    #[tokio::test]
    async fn test_results_are_bounded_ranked_and_scoped() {
        let index = index_of(
            "fy2022",
            &[
                "net cost of operations rose",
                "total cost: 120",
                "revenue grew by four percent",
                "total cost of debt held by the public",
            ],
        )
        .await;

        let results = index.query("total cost", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|r| r.chunk.collection_name == "fy2022"));
        assert!(results.iter().any(|r| r.chunk.text == "total cost: 120"));
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = CollectionIndex::build(
            "empty",
            Vec::new(),
            Arc::new(BrokenEmbedder),
            &IndexBuildOptions::default(),
        )
        .await
        .unwrap();
        assert!(index.is_empty());
        // The broken embedder would fail if it were called
        assert!(index.query("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_rejects_foreign_chunks() {
        let result = CollectionIndex::build(
            "fy2021",
            vec![chunk("fy2022", 0, "total cost: 120")],
            Arc::new(MockEmbedder::new(16)),
            &IndexBuildOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_build_fails_on_malformed_vectors() {
        let result = CollectionIndex::build(
            "fy2021",
            vec![chunk("fy2021", 0, "total cost: 100")],
            Arc::new(BrokenEmbedder),
            &IndexBuildOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(AppError::EmbeddingError { .. })));
    }

    #[tokio::test]
    async fn test_batches_keep_chunk_alignment() {
        let texts: Vec<String> = (0..10).map(|i| format!("line item {} amount {}", i, i * 10)).collect();
        let chunks = texts.iter().enumerate().map(|(i, t)| chunk("fy2021", i, t)).collect();
        let options = IndexBuildOptions {
            batch_size: 3,
            concurrency: 2,
            ..IndexBuildOptions::default()
        };
        let index = CollectionIndex::build("fy2021", chunks, Arc::new(MockEmbedder::new(256)), &options)
            .await
            .unwrap();

        assert_eq!(index.len(), 10);
        let top = index.query("line item 7 amount 70", 1).await.unwrap();
        assert_eq!(top[0].chunk.text, "line item 7 amount 70");
    }
}
