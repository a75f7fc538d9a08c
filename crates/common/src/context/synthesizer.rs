//! Answer synthesis
//!
//! Combines ordered sub-answers into one final answer. When decomposition
//! produced nothing, the configured fallback decides what the question is
//! answered from.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::router::answer_prompt;
use super::{format_context, PipelineSettings};
use crate::config::FallbackPolicy;
use crate::errors::Result;
use crate::llm::{CompletionOptions, LanguageModel};
use crate::models::{FinalAnswer, SubAnswer};
use crate::resilience::bounded;
use crate::retrieval::{CollectionIndex, CollectionRegistry};

const NO_ANSWER_TEXT: &str =
    "I could not find enough information in the available reports to answer this question.";

/// Source used to answer a question that was not decomposed
#[derive(Clone)]
pub enum Fallback {
    /// Ask the language model directly, without retrieved context
    NoContext,
    /// Retrieve from one collection and answer from its top chunks
    DefaultCollection(Arc<CollectionIndex>),
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::NoContext => f.write_str("NoContext"),
            Fallback::DefaultCollection(index) => {
                f.debug_tuple("DefaultCollection").field(&index.name()).finish()
            }
        }
    }
}

impl Fallback {
    /// Resolve a configured policy against the registry
    pub fn resolve(policy: &FallbackPolicy, registry: &CollectionRegistry) -> Result<Self> {
        match policy {
            FallbackPolicy::NoContext => Ok(Fallback::NoContext),
            FallbackPolicy::DefaultCollection(name) => {
                Ok(Fallback::DefaultCollection(registry.resolve(name)?))
            }
        }
    }
}

/// Produces the final answer from sub-answers
pub struct AnswerSynthesizer {
    llm: Arc<dyn LanguageModel>,
    options: CompletionOptions,
    timeout: Duration,
    top_k: i64,
    fallback: Fallback,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: &PipelineSettings, fallback: Fallback) -> Self {
        Self {
            llm,
            options: settings.completion.clone(),
            timeout: settings.llm_timeout,
            top_k: i64::try_from(settings.top_k).unwrap_or(i64::MAX),
            fallback,
        }
    }

    /// Synthesize the final answer to `question`.
    ///
    /// The returned text is never empty. Provider failures and timeouts
    /// propagate: at this stage there is nothing left to degrade into.
    #[instrument(skip_all, fields(sub_answers = sub_answers.len()))]
    pub async fn synthesize(&self, question: &str, sub_answers: Vec<SubAnswer>) -> Result<FinalAnswer> {
        if sub_answers.is_empty() {
            info!(fallback = ?self.fallback, "No sub-questions, answering with fallback");
            let text = self.answer_directly(question).await?;
            return Ok(FinalAnswer {
                text,
                sub_answers,
                used_fallback: true,
            });
        }

        let prompt = synthesis_prompt(question, &sub_answers);
        let reply = self.complete("synthesis", &prompt).await?;

        let text = if reply.trim().is_empty() {
            debug!("Empty synthesis output, joining sub-answers");
            sub_answers
                .iter()
                .map(|a| a.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            reply.trim().to_string()
        };

        Ok(FinalAnswer {
            text: non_empty(text),
            sub_answers,
            used_fallback: false,
        })
    }

    async fn answer_directly(&self, question: &str) -> Result<String> {
        let prompt = match &self.fallback {
            Fallback::NoContext => direct_prompt(question),
            Fallback::DefaultCollection(index) => {
                let retrieved = bounded("fallback_retrieval", self.timeout, index.query(question, self.top_k)).await?;
                if retrieved.is_empty() {
                    direct_prompt(question)
                } else {
                    let context = format_context(retrieved.iter().map(|r| r.chunk.text.as_str()));
                    answer_prompt(&context, question)
                }
            }
        };

        let reply = self.complete("fallback_answer", &prompt).await?;
        Ok(non_empty(reply.trim().to_string()))
    }

    async fn complete(&self, stage: &str, prompt: &str) -> Result<String> {
        bounded(stage, self.timeout, self.llm.complete(prompt, &self.options)).await
    }
}

fn non_empty(text: String) -> String {
    if text.trim().is_empty() {
        NO_ANSWER_TEXT.to_string()
    } else {
        text
    }
}

fn synthesis_prompt(question: &str, sub_answers: &[SubAnswer]) -> String {
    let mut prompt = String::from("Sub-question answers, one per source:\n");

    for (i, answer) in sub_answers.iter().enumerate() {
        let marker = if answer.is_degraded() { " (unavailable)" } else { "" };
        prompt.push_str(&format!(
            "[{}] Source: {}{}\nSub-question: {}\nResponse: {}\n\n",
            i + 1,
            answer.source_collection(),
            marker,
            answer.sub_question.text,
            answer.text
        ));
    }

    prompt.push_str(&format!(
        "Using only the sub-question answers above, write one coherent answer to the \
         original question. Mention when a source could not provide information.\n\
         Question: {}\n\
         Answer:",
        question
    ));
    prompt
}

fn direct_prompt(question: &str) -> String {
    format!(
        "Answer the question as well as you can. If you do not know the answer, say so.\n\
         Question: {}\n\
         Answer:",
        question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{fast_settings, registry_of};
    use crate::errors::AppError;
    use crate::llm::ScriptedLanguageModel;
    use crate::models::SubQuestion;

    fn sub_answers() -> Vec<SubAnswer> {
        vec![
            SubAnswer::answered(SubQuestion::new("fy2021", "Total cost?"), "FY2021 total cost was 100", 1),
            SubAnswer::answered(SubQuestion::new("fy2022", "Total cost?"), "FY2022 total cost was 120", 1),
        ]
    }

    #[tokio::test]
    async fn test_synthesizes_in_sub_answer_order() {
        let llm = Arc::new(ScriptedLanguageModel::new().when(
            &["Sub-question answers", "was 100", "was 120"],
            "Total cost rose from 100 to 120.",
        ));
        let synthesizer = AnswerSynthesizer::new(llm.clone(), &fast_settings(), Fallback::NoContext);

        let answer = synthesizer.synthesize("compare total cost", sub_answers()).await.unwrap();
        assert_eq!(answer.text, "Total cost rose from 100 to 120.");
        assert!(!answer.used_fallback);
        assert_eq!(answer.sub_answers.len(), 2);

        let prompt = &llm.prompts()[0];
        assert!(prompt.find("was 100").unwrap() < prompt.find("was 120").unwrap());
        assert!(prompt.contains("Question: compare total cost"));
    }

    #[tokio::test]
    async fn test_empty_sub_answers_fall_back_without_context() {
        let llm = Arc::new(ScriptedLanguageModel::new().otherwise(""));
        let synthesizer = AnswerSynthesizer::new(llm.clone(), &fast_settings(), Fallback::NoContext);

        let answer = synthesizer.synthesize("hello?", Vec::new()).await.unwrap();
        assert!(answer.used_fallback);
        assert!(!answer.text.trim().is_empty());
        assert!(!llm.prompts()[0].contains("Context information"));
    }

    #[tokio::test]
    async fn test_default_collection_fallback_uses_retrieval() {
        let registry = registry_of(&[("fy2021", "total cost: 100")]).await;
        let fallback =
            Fallback::resolve(&FallbackPolicy::DefaultCollection("fy2021".into()), &registry).unwrap();
        let llm = ScriptedLanguageModel::new().when(&["Context information", "total cost: 100"], "It was 100.");
        let synthesizer = AnswerSynthesizer::new(Arc::new(llm), &fast_settings(), fallback);

        let answer = synthesizer.synthesize("total cost?", Vec::new()).await.unwrap();
        assert_eq!(answer.text, "It was 100.");
        assert!(answer.used_fallback);
    }

    #[tokio::test]
    async fn test_fallback_must_resolve() {
        let registry = registry_of(&[("fy2021", "total cost: 100")]).await;
        assert!(matches!(
            Fallback::resolve(&FallbackPolicy::DefaultCollection("fy1999".into()), &registry),
            Err(AppError::UnknownCollection { .. })
        ));
    }

    #[tokio::test]
    async fn test_blank_synthesis_joins_sub_answers() {
        let llm = ScriptedLanguageModel::new().otherwise("   ");
        let synthesizer = AnswerSynthesizer::new(Arc::new(llm), &fast_settings(), Fallback::NoContext);

        let answer = synthesizer.synthesize("compare", sub_answers()).await.unwrap();
        assert!(answer.text.contains("100"));
        assert!(answer.text.contains("120"));
    }

    #[tokio::test]
    async fn test_synthesis_failure_propagates() {
        let llm = ScriptedLanguageModel::new().fail_when(&["Sub-question answers"], "unreachable");
        let synthesizer = AnswerSynthesizer::new(Arc::new(llm), &fast_settings(), Fallback::NoContext);
        assert!(synthesizer.synthesize("compare", sub_answers()).await.is_err());
    }

    #[test]
    fn test_degraded_answers_are_marked() {
        let answers = vec![SubAnswer::degraded(
            SubQuestion::new("fy2022", "Total cost?"),
            "The fy2022 collection did not answer in time.",
            "timeout",
        )];
        let prompt = synthesis_prompt("compare", &answers);
        assert!(prompt.contains("Source: fy2022 (unavailable)"));
    }
}
