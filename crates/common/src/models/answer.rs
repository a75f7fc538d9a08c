//! Per-query values: sub-questions, sub-answers and the final answer
//!
//! These are created and discarded within a single query.

use serde::{Deserialize, Serialize};

/// A question addressed to exactly one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    pub target_collection: String,
    pub text: String,
}

impl SubQuestion {
    pub fn new(target_collection: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            target_collection: target_collection.into(),
            text: text.into(),
        }
    }
}

/// How a sub-answer was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubAnswerStatus {
    /// Retrieval and generation both succeeded
    Answered,
    /// Produced on a fallback or error path
    Degraded { reason: String },
}

/// Answer to one sub-question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAnswer {
    pub sub_question: SubQuestion,
    pub text: String,
    pub status: SubAnswerStatus,
    /// Number of chunks the answer was generated from
    pub context_chunks: usize,
}

impl SubAnswer {
    pub fn answered(sub_question: SubQuestion, text: impl Into<String>, context_chunks: usize) -> Self {
        Self {
            sub_question,
            text: text.into(),
            status: SubAnswerStatus::Answered,
            context_chunks,
        }
    }

    pub fn degraded(sub_question: SubQuestion, text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sub_question,
            text: text.into(),
            status: SubAnswerStatus::Degraded {
                reason: reason.into(),
            },
            context_chunks: 0,
        }
    }

    /// Collection this answer was drawn from
    pub fn source_collection(&self) -> &str {
        &self.sub_question.target_collection
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, SubAnswerStatus::Degraded { .. })
    }
}

/// The answer returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub text: String,
    /// Sub-answers the text was synthesized from, in decomposition order
    pub sub_answers: Vec<SubAnswer>,
    /// True when decomposition produced nothing and the fallback policy answered
    pub used_fallback: bool,
}
