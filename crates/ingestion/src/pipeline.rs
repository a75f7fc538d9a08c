//! Startup ingestion pipeline
//!
//! Loads, chunks and indexes every configured collection. Collections are
//! processed concurrently but registered in configuration order. Any
//! failure aborts the whole run so nothing is served half-built.

use futures::future::try_join_all;
use reportqa_common::config::{AppConfig, CollectionConfig};
use reportqa_common::embeddings::Embedder;
use reportqa_common::metrics;
use reportqa_common::models::{Chunk, CollectionDescriptor};
use reportqa_common::retrieval::{CollectionIndex, CollectionRegistry, IndexBuildOptions};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

use crate::chunker::ChunkingPolicy;
use crate::errors::IngestionError;
use crate::store::DocumentStore;

/// One collection after ingestion
#[derive(Debug)]
pub struct IngestedCollection {
    pub descriptor: CollectionDescriptor,
    pub index: CollectionIndex,
    /// Pages read from the source
    pub pages: usize,
}

/// Ingest every configured collection, in configuration order
pub async fn ingest_collections(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Vec<IngestedCollection>, IngestionError> {
    let policy = ChunkingPolicy::from_config(&config.ingestion)?;
    let options = IndexBuildOptions {
        batch_size: config.embedding.batch_size,
        concurrency: config.embedding.concurrency,
        timeout: config.embedding_timeout(),
    };

    // try_join_all keeps input order
    try_join_all(
        config
            .collections
            .iter()
            .map(|collection| ingest_collection(collection, &policy, embedder.clone(), &options)),
    )
    .await
}

/// Ingest every configured collection and register it
pub async fn build_registry(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<CollectionRegistry, IngestionError> {
    let mut registry = CollectionRegistry::new();
    for ingested in ingest_collections(config, embedder).await? {
        registry.register(ingested.descriptor, ingested.index)?;
    }
    info!(collections = registry.len(), "Collection registry ready");
    Ok(registry)
}

#[instrument(skip_all, fields(collection = %collection.name))]
async fn ingest_collection(
    collection: &CollectionConfig,
    policy: &ChunkingPolicy,
    embedder: Arc<dyn Embedder>,
    options: &IndexBuildOptions,
) -> Result<IngestedCollection, IngestionError> {
    let started = Instant::now();

    // PDF parsing is blocking work
    let name = collection.name.clone();
    let path = collection.path.clone();
    let document = tokio::task::spawn_blocking(move || DocumentStore::new().load(&name, &path))
        .await
        .map_err(|e| IngestionError::TaskFailed(e.to_string()))??;

    let pages = document.pages.len();
    info!("loaded {} with {} pages", collection.name, pages);

    let chunks: Vec<Chunk> = DocumentStore::new().chunk(&document, policy).collect();
    let index = CollectionIndex::build(&collection.name, chunks, embedder, options).await?;
    info!("built index for {} with {} chunks", collection.name, index.len());

    metrics::record_ingestion(started.elapsed().as_secs_f64(), &collection.name, pages, index.len());

    Ok(IngestedCollection {
        descriptor: CollectionDescriptor::new(&collection.name, &collection.description),
        index,
        pages,
    })
}
