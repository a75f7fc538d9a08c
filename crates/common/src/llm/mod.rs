//! Language model abstraction
//!
//! One `complete(prompt, options)` call is all the pipeline needs: the
//! decomposer, the per-collection answer step and the synthesizer all go
//! through it. Providers:
//! - OpenAI-compatible chat completions
//! - A canned offline responder for development without an API key
//! - A rule-based scripted model for deterministic tests (`test-util` feature)

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::resilience::with_retries;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(any(test, feature = "test-util"))]
mod scripted;
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedLanguageModel;

/// Per-call generation options
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Maximum output tokens
    pub max_tokens: usize,

    /// Temperature (0.0 - 1.0)
    pub temperature: f32,

    /// System prompt override
    pub system_prompt: Option<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.0,
            system_prompt: None,
        }
    }
}

impl CompletionOptions {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Trait for text completion providers
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a prompt
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI-compatible chat completions client
pub struct OpenAIChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAIChatModel {
    /// Create a new chat model client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "OpenAI language model provider requires an API key".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn call_api(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let system = options
            .system_prompt
            .as_deref()
            .unwrap_or("You are a helpful financial analysis assistant.");

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LanguageModel {
                message: format!("LLM API request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LanguageModel {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| AppError::LanguageModel {
                message: format!("Failed to parse LLM response: {}", e),
            })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::LanguageModel {
                message: "Empty response from LLM".to_string(),
            })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let started = Instant::now();
        let outcome =
            with_retries("completion", self.max_retries, || self.call_api(prompt, options)).await;
        metrics::record_completion(started.elapsed().as_secs_f64(), &self.model, outcome.is_ok());
        outcome
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Offline responder used when no API key is configured
pub struct MockLanguageModel;

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String> {
        let question = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Question:"))
            .map(str::trim)
            .unwrap_or("your question");

        Ok(format!(
            "Based on the provided context, here is an answer to: {}\n\n\
             [Mock response - LLM API key not configured]",
            question
        ))
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

/// Create a language model based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        "mock" => Ok(Arc::new(MockLanguageModel)),
        other => Err(AppError::Configuration {
            message: format!("Unknown language model provider: {}", other),
        }),
    }
}
