//! Sub-question query pipeline
//!
//! The pipeline answers one question in three stages:
//! - Decomposition into per-collection sub-questions
//! - Routing each sub-question to its collection and answering it from retrieved chunks
//! - Synthesis of the sub-answers into one final answer
//!
//! `QueryFacade` is the single entry point that runs them in sequence.

mod decomposer;
mod facade;
mod router;
mod synthesizer;

pub use decomposer::QuestionDecomposer;
pub use facade::QueryFacade;
pub use router::SubQuestionRouter;
pub use synthesizer::{AnswerSynthesizer, Fallback};

use std::time::Duration;

use crate::config::AppConfig;
use crate::llm::CompletionOptions;

/// Tunables shared by the pipeline stages
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Chunks retrieved per sub-question
    pub top_k: usize,
    /// Sub-questions dispatched at once
    pub max_concurrency: usize,
    /// Budget for a single completion call
    pub llm_timeout: Duration,
    /// Budget for retrieving and answering one sub-question
    pub sub_question_timeout: Duration,
    pub completion: CompletionOptions,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: crate::DEFAULT_TOP_K,
            max_concurrency: 4,
            llm_timeout: Duration::from_secs(30),
            sub_question_timeout: Duration::from_secs(45),
            completion: CompletionOptions::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_concurrency: config.retrieval.max_concurrency,
            llm_timeout: config.llm_timeout(),
            sub_question_timeout: config.sub_question_timeout(),
            completion: CompletionOptions::from_config(&config.llm),
        }
    }

    /// Upper bound on one query: decomposition, routing and synthesis in sequence
    pub fn query_budget(&self) -> Duration {
        self.llm_timeout + self.sub_question_timeout + self.llm_timeout
    }
}

/// Render retrieved chunk texts as a numbered context block
pub(crate) fn format_context<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| format!("[{}] {}", i + 1, text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_budget_sums_stages() {
        let settings = PipelineSettings::from_config(&AppConfig::default());
        assert_eq!(settings.query_budget(), Duration::from_secs(30 + 45 + 30));
    }

    #[test]
    fn test_format_context_numbers_entries() {
        assert_eq!(format_context(["a ", " b"]), "[1] a\n\n[2] b");
    }
}
