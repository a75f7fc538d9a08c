//! ReportQA Gateway
//!
//! Serves the question form and the answer endpoint.
//! Startup:
//! - Loads configuration and sets up tracing and metrics
//! - Ingests and indexes every configured collection (fail fast)
//! - Builds the query pipeline once and shares it with the handlers

mod handlers;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use reportqa_common::{
    config::AppConfig,
    embeddings::create_embedder,
    llm::create_language_model,
    metrics::{self, LATENCY_BUCKETS},
    telemetry, QueryFacade, VERSION,
};
use reportqa_ingestion::build_registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub facade: Arc<QueryFacade>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;

    telemetry::init_tracing(&config.observability);
    info!("Starting ReportQA gateway v{}", VERSION);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }

    let embedder = create_embedder(&config.embedding).context("failed to create embedder")?;
    let llm = create_language_model(&config.llm).context("failed to create language model")?;

    info!(
        collections = config.collections.len(),
        embedding_model = embedder.model_name(),
        chat_model = llm.model_name(),
        "Ingesting collections..."
    );
    let registry = build_registry(&config, embedder).await.map_err(|e| {
        error!(error = %e, "Ingestion failed, aborting startup");
        e
    })?;

    let facade = QueryFacade::new(&config, Arc::new(registry), llm)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;

    let state = AppState {
        config: Arc::new(config),
        facade: Arc::new(facade),
    };
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the application router
pub(crate) fn create_router(state: AppState) -> Router {
    // The form is served from the same origin; CORS is for other callers of /answer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    Router::new()
        .route("/", get(handlers::form::form))
        .route("/answer", post(handlers::answer::answer))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Serve Prometheus metrics on their own listener
fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), LATENCY_BUCKETS)?
        .install()
        .context("failed to install Prometheus exporter")?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
