//! ReportQA Ingestion dry run
//!
//! Runs the startup ingestion phase on its own and reports what it built:
//! 1. Loads configuration (optionally from a file given as the first argument)
//! 2. Extracts, chunks and embeds every configured collection
//! 3. Prints per-collection page and chunk counts

use reportqa_common::{config::AppConfig, embeddings::create_embedder, telemetry, VERSION};
use reportqa_ingestion::{ingest_collections, ChunkingPolicy};
use std::time::Instant;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::from_file(&path)?,
        None => AppConfig::load()?,
    };

    telemetry::init_tracing(&config.observability);
    info!("Starting ReportQA ingestion v{}", VERSION);

    let policy = ChunkingPolicy::from_config(&config.ingestion)?;
    info!(
        chunk_size = policy.chunk_size(),
        chunk_overlap = policy.chunk_overlap(),
        collections = config.collections.len(),
        embedding_model = %config.embedding.model,
        "Ingesting collections"
    );

    let embedder = create_embedder(&config.embedding)?;
    let started = Instant::now();
    let ingested = ingest_collections(&config, embedder).await.map_err(|e| {
        tracing::error!(error = %e, "Ingestion failed");
        e
    })?;

    for collection in &ingested {
        println!(
            "{:<32} {:>6} pages {:>8} chunks",
            collection.descriptor.name,
            collection.pages,
            collection.index.len()
        );
    }

    info!(
        collections = ingested.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Ingestion complete"
    );
    Ok(())
}
