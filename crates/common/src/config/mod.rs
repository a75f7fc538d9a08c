//! Configuration management for ReportQA services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Query-time retrieval and routing configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Chunking configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Document collections, in registration order
    #[serde(default = "default_collections")]
    pub collections: Vec<CollectionConfig>,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Title shown on the question form
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent embedding batches while building one index
    #[serde(default = "default_build_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Language model provider: openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,

    /// Maximum output tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Timeout in seconds for a single completion
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

/// What the synthesizer answers from when decomposition yields no sub-questions
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Ask the language model directly, without retrieved context
    #[default]
    NoContext,
    /// Retrieve from the named collection and answer from its chunks
    DefaultCollection(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Chunks retrieved per sub-question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Sub-questions dispatched concurrently within one query
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Budget for retrieving and answering one sub-question, in seconds
    #[serde(default = "default_sub_question_timeout")]
    pub sub_question_timeout_secs: u64,

    /// Behaviour when decomposition produces no sub-questions
    #[serde(default)]
    pub fallback: FallbackPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Fragments shorter than this are dropped unless they are a page's only chunk
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Unique collection name, used as the routing key
    pub name: String,

    /// Source document path (PDF or plain text)
    pub path: String,

    /// Routing description shown to the decomposer
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. "info", "reportqa_common=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_title() -> String {
    "Analyzing the U.S. Government's Financial Reports for 2021 and 2022".to_string()
}
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { 1536 }
fn default_provider_timeout() -> u64 { 30 }
fn default_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 64 }
fn default_build_concurrency() -> usize { 4 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { crate::DEFAULT_CHAT_MODEL.to_string() }
fn default_max_tokens() -> usize { 512 }
fn default_top_k() -> usize { crate::DEFAULT_TOP_K }
fn default_max_concurrency() -> usize { 4 }
fn default_sub_question_timeout() -> u64 { 45 }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_min_chunk_size() -> usize { 100 }
fn default_log_level() -> String { "info".to_string() }

fn default_collections() -> Vec<CollectionConfig> {
    vec![
        CollectionConfig {
            name: "executive_summary_2021".to_string(),
            path: "reports/executive-summary-2021.pdf".to_string(),
            description: "Provides information on US government financial report executive summary 2021"
                .to_string(),
        },
        CollectionConfig {
            name: "executive_summary_2022".to_string(),
            path: "reports/executive-summary-2022.pdf".to_string(),
            description: "Provides information on US government financial report executive summary 2022"
                .to_string(),
        },
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            title: default_title(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_provider_timeout(),
            max_retries: default_retries(),
            batch_size: default_batch_size(),
            concurrency: default_build_concurrency(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_provider_timeout(),
            max_retries: default_retries(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_concurrency: default_max_concurrency(),
            sub_question_timeout_secs: default_sub_question_timeout(),
            fallback: FallbackPolicy::default(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
            metrics_port: 0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            ingestion: IngestionConfig::default(),
            collections: default_collections(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files, then validate it
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::finish(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let mut app: AppConfig = config.try_deserialize()?;
        app.apply_api_key_fallback(std::env::var("OPENAI_API_KEY").ok());
        app.validate()?;
        Ok(app)
    }

    /// Fill unset provider API keys from a shared key (usually `OPENAI_API_KEY`)
    pub fn apply_api_key_fallback(&mut self, key: Option<String>) {
        let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
            return;
        };
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = Some(key.clone());
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = Some(key);
        }
    }

    /// Reject configurations that would fail later in a less obvious way
    pub fn validate(&self) -> Result<()> {
        if self.collections.is_empty() {
            return Err(config_error("at least one collection must be configured"));
        }

        let mut seen = HashSet::new();
        for collection in &self.collections {
            if collection.name.trim().is_empty() {
                return Err(config_error("collection names must not be empty"));
            }
            if !seen.insert(collection.name.as_str()) {
                return Err(config_error(format!(
                    "collection '{}' is configured more than once",
                    collection.name
                )));
            }
        }

        if self.retrieval.top_k == 0 {
            return Err(config_error("retrieval.top_k must be positive"));
        }
        if self.retrieval.max_concurrency == 0 {
            return Err(config_error("retrieval.max_concurrency must be positive"));
        }
        if self.ingestion.chunk_size == 0 {
            return Err(config_error("ingestion.chunk_size must be positive"));
        }
        if self.ingestion.chunk_overlap >= self.ingestion.chunk_size {
            return Err(config_error(
                "ingestion.chunk_overlap must be smaller than ingestion.chunk_size",
            ));
        }
        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(config_error(
                "embedding.batch_size and embedding.concurrency must be positive",
            ));
        }

        if let FallbackPolicy::DefaultCollection(name) = &self.retrieval.fallback {
            if !seen.contains(name.as_str()) {
                return Err(config_error(format!(
                    "fallback collection '{}' is not configured",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Per-call embedding timeout
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }

    /// Per-call completion timeout
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    /// Per-sub-question timeout
    pub fn sub_question_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.sub_question_timeout_secs)
    }
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError::Configuration {
        message: message.into(),
    }
}
