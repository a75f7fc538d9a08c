//! Scripted language model for tests

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use super::{CompletionOptions, LanguageModel};
use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
struct ScriptRule {
    needles: Vec<String>,
    reply: std::result::Result<String, String>,
    delay: Duration,
}

/// Deterministic fake: replies with the first rule whose needles all occur in the prompt
#[derive(Default)]
pub struct ScriptedLanguageModel {
    rules: Vec<ScriptRule>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `reply` when every needle occurs in the prompt
    pub fn when(self, needles: &[&str], reply: impl Into<String>) -> Self {
        self.push(needles, Ok(reply.into()), Duration::ZERO)
    }

    /// Like [`when`](Self::when), but sleep for `delay` before replying
    pub fn when_slow(self, needles: &[&str], reply: impl Into<String>, delay: Duration) -> Self {
        self.push(needles, Ok(reply.into()), delay)
    }

    /// Fail with a language model error when every needle occurs in the prompt
    pub fn fail_when(self, needles: &[&str], message: impl Into<String>) -> Self {
        self.push(needles, Err(message.into()), Duration::ZERO)
    }

    /// Reply used when no rule matches; without it an unmatched prompt is an error
    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Every prompt received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn push(
        mut self,
        needles: &[&str],
        reply: std::result::Result<String, String>,
        delay: Duration,
    ) -> Self {
        self.rules.push(ScriptRule {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            reply,
            delay,
        });
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let rule = self
            .rules
            .iter()
            .find(|r| r.needles.iter().all(|n| prompt.contains(n.as_str())))
            .cloned();

        match rule {
            Some(rule) => {
                if !rule.delay.is_zero() {
                    tokio::time::sleep(rule.delay).await;
                }
                rule.reply
                    .map_err(|message| AppError::LanguageModel { message })
            }
            None => self.fallback.clone().ok_or_else(|| AppError::LanguageModel {
                message: "no scripted reply for prompt".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted-llm"
    }
}
