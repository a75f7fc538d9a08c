//! Sub-question dispatch
//!
//! Each sub-question is resolved against the registry, answered from the top
//! chunks of its collection and time-boxed on its own. Failures that only
//! affect one sub-question come back as degraded sub-answers so the rest of
//! the batch still reaches synthesis.

use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{format_context, PipelineSettings};
use crate::errors::{AppError, Result};
use crate::llm::{CompletionOptions, LanguageModel};
use crate::metrics;
use crate::models::{SubAnswer, SubQuestion};
use crate::resilience::bounded;
use crate::retrieval::{CollectionIndex, CollectionRegistry};

/// Dispatches sub-questions to their collections
pub struct SubQuestionRouter {
    llm: Arc<dyn LanguageModel>,
    options: CompletionOptions,
    top_k: i64,
    max_concurrency: usize,
    llm_timeout: Duration,
    sub_question_timeout: Duration,
}

impl SubQuestionRouter {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: &PipelineSettings) -> Self {
        Self {
            llm,
            options: settings.completion.clone(),
            top_k: i64::try_from(settings.top_k).unwrap_or(i64::MAX),
            max_concurrency: settings.max_concurrency.max(1),
            llm_timeout: settings.llm_timeout,
            sub_question_timeout: settings.sub_question_timeout,
        }
    }

    /// Answer every sub-question against its collection.
    ///
    /// The output has one entry per input, in input order, whatever order
    /// the dispatches finish in. Only an embedding provider failure during
    /// retrieval fails the whole batch.
    #[instrument(skip_all, fields(sub_questions = sub_questions.len()))]
    pub async fn route(
        &self,
        sub_questions: &[SubQuestion],
        registry: &CollectionRegistry,
    ) -> Result<Vec<SubAnswer>> {
        let dispatches: Vec<_> = sub_questions
            .iter()
            .map(|sub_question| self.dispatch(sub_question, registry))
            .collect();
        futures::stream::iter(dispatches)
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }

    async fn dispatch(&self, sub_question: &SubQuestion, registry: &CollectionRegistry) -> Result<SubAnswer> {
        let collection = sub_question.target_collection.as_str();

        let index = match registry.resolve(collection) {
            Ok(index) => index,
            Err(e) => {
                warn!(collection, "Sub-question targets an unregistered collection");
                return Ok(self.degrade(
                    sub_question,
                    format!("No information is available: '{}' is not a known collection.", collection),
                    e,
                ));
            }
        };

        let outcome = bounded(
            "sub_question",
            self.sub_question_timeout,
            self.answer_from(sub_question, &index),
        )
        .await;

        match outcome {
            Ok(answer) => {
                metrics::record_sub_answer(collection, answer.is_degraded());
                Ok(answer)
            }
            Err(e @ AppError::ProviderTimeout { .. }) => Ok(self.degrade(
                sub_question,
                format!("The {} collection did not answer in time.", collection),
                e,
            )),
            Err(e @ (AppError::LanguageModel { .. } | AppError::HttpClient(_))) => Ok(self.degrade(
                sub_question,
                format!("An answer could not be generated from the {} collection.", collection),
                e,
            )),
            Err(e) => {
                warn!(collection, error = %e, "Sub-question failed");
                Err(e)
            }
        }
    }

    async fn answer_from(&self, sub_question: &SubQuestion, index: &CollectionIndex) -> Result<SubAnswer> {
        let retrieved = index.query(&sub_question.text, self.top_k).await?;

        if retrieved.is_empty() {
            return Ok(SubAnswer::degraded(
                sub_question.clone(),
                format!("The {} collection has no information on this.", index.name()),
                "no chunks retrieved",
            ));
        }

        debug!(
            collection = index.name(),
            chunks = retrieved.len(),
            top_score = retrieved[0].score,
            "Retrieved context"
        );

        let context = format_context(retrieved.iter().map(|r| r.chunk.text.as_str()));
        let prompt = answer_prompt(&context, &sub_question.text);
        let reply = bounded(
            "answer_generation",
            self.llm_timeout,
            self.llm.complete(&prompt, &self.options),
        )
        .await?;

        let reply = reply.trim();
        if reply.is_empty() {
            return Ok(SubAnswer::degraded(
                sub_question.clone(),
                format!("An answer could not be generated from the {} collection.", index.name()),
                "empty completion",
            ));
        }

        info!(collection = index.name(), "Sub-question answered");
        Ok(SubAnswer::answered(sub_question.clone(), reply, retrieved.len()))
    }

    fn degrade(&self, sub_question: &SubQuestion, text: String, cause: AppError) -> SubAnswer {
        warn!(
            collection = %sub_question.target_collection,
            error = %cause,
            "Sub-question degraded"
        );
        metrics::record_sub_answer(&sub_question.target_collection, true);
        SubAnswer::degraded(sub_question.clone(), text, cause.to_string())
    }
}

/// Question-answering prompt over retrieved context
pub(crate) fn answer_prompt(context: &str, question: &str) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the question.\n\
         Question: {}\n\
         Answer:",
        context, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{fast_settings, registry_of};
    use crate::embeddings::Embedder;
    use crate::llm::ScriptedLanguageModel;
    use crate::models::{Chunk, CollectionDescriptor};
    use crate::retrieval::IndexBuildOptions;
    use async_trait::async_trait;

    fn scripted() -> ScriptedLanguageModel {
        ScriptedLanguageModel::new()
            .when(&["Context information", "total cost: 100"], "FY2021 total cost was 100")
            .when(&["Context information", "total cost: 120"], "FY2022 total cost was 120")
    }

    #[tokio::test]
    async fn test_routes_to_target_collections() {
        let registry = registry_of(&[("fy2021", "total cost: 100"), ("fy2022", "total cost: 120")]).await;
        let router = SubQuestionRouter::new(Arc::new(scripted()), &fast_settings());

        let answers = router
            .route(
                &[
                    SubQuestion::new("fy2021", "What was the total cost?"),
                    SubQuestion::new("fy2022", "What was the total cost?"),
                ],
                &registry,
            )
            .await
            .unwrap();

        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].text, "FY2021 total cost was 100");
        assert_eq!(answers[0].source_collection(), "fy2021");
        assert_eq!(answers[0].context_chunks, 1);
        assert_eq!(answers[1].text, "FY2022 total cost was 120");
        assert!(answers.iter().all(|a| !a.is_degraded()));
    }

    #[tokio::test]
    async fn test_preserves_input_order() {
        let registry = registry_of(&[("fy2021", "total cost: 100"), ("fy2022", "total cost: 120")]).await;
        // The first sub-question finishes last
        let llm = ScriptedLanguageModel::new()
            .when_slow(
                &["Context information", "total cost: 100"],
                "slow 2021",
                Duration::from_millis(150),
            )
            .when(&["Context information", "total cost: 120"], "fast 2022");
        let router = SubQuestionRouter::new(Arc::new(llm), &fast_settings());

        let answers = router
            .route(
                &[
                    SubQuestion::new("fy2021", "cost?"),
                    SubQuestion::new("fy2022", "cost?"),
                    SubQuestion::new("fy2021", "cost again?"),
                ],
                &registry,
            )
            .await
            .unwrap();

        let texts: Vec<&str> = answers.iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, vec!["slow 2021", "fast 2022", "slow 2021"]);
        assert_eq!(answers[2].sub_question.text, "cost again?");
    }

    #[tokio::test]
    async fn test_unknown_collection_degrades() {
        let registry = registry_of(&[("fy2021", "total cost: 100")]).await;
        let router = SubQuestionRouter::new(Arc::new(scripted()), &fast_settings());

        let answers = router
            .route(
                &[
                    SubQuestion::new("bogus", "What was the total cost?"),
                    SubQuestion::new("fy2021", "What was the total cost?"),
                ],
                &registry,
            )
            .await
            .unwrap();

        assert_eq!(answers.len(), 2);
        assert!(answers[0].is_degraded());
        assert!(answers[0].text.contains("bogus"));
        assert_eq!(answers[1].text, "FY2021 total cost was 100");
    }

    #[tokio::test]
    async fn test_slow_generation_degrades() {
        let registry = registry_of(&[("fy2021", "total cost: 100")]).await;
        let llm = ScriptedLanguageModel::new().when_slow(
            &["Context information"],
            "too late",
            Duration::from_millis(500),
        );
        let settings = PipelineSettings {
            sub_question_timeout: Duration::from_millis(50),
            ..fast_settings()
        };
        let router = SubQuestionRouter::new(Arc::new(llm), &settings);

        let answers = router
            .route(&[SubQuestion::new("fy2021", "cost?")], &registry)
            .await
            .unwrap();
        assert!(answers[0].is_degraded());
        assert!(answers[0].text.contains("in time"));
    }

    #[tokio::test]
    async fn test_generation_failure_degrades() {
        let registry = registry_of(&[("fy2021", "total cost: 100")]).await;
        let llm = ScriptedLanguageModel::new().fail_when(&["Context information"], "provider down");
        let router = SubQuestionRouter::new(Arc::new(llm), &fast_settings());

        let answers = router
            .route(&[SubQuestion::new("fy2021", "cost?")], &registry)
            .await
            .unwrap();
        assert!(answers[0].is_degraded());
        // Raw provider text stays out of the answer text
        assert!(!answers[0].text.contains("provider down"));
    }

    #[tokio::test]
    async fn test_empty_collection_degrades_without_generation() {
        let mut registry = CollectionRegistry::new();
        let index = CollectionIndex::build(
            "empty",
            Vec::new(),
            Arc::new(crate::embeddings::MockEmbedder::new(8)),
            &IndexBuildOptions::default(),
        )
        .await
        .unwrap();
        registry
            .register(CollectionDescriptor::new("empty", "nothing"), index)
            .unwrap();

        let llm = Arc::new(ScriptedLanguageModel::new().otherwise("should not be called"));
        let router = SubQuestionRouter::new(llm.clone(), &fast_settings());
        let answers = router
            .route(&[SubQuestion::new("empty", "anything?")], &registry)
            .await
            .unwrap();

        assert!(answers[0].is_degraded());
        assert!(llm.prompts().is_empty());
    }

    struct FlakyEmbedder {
        healthy: crate::embeddings::MockEmbedder,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, _text: &str) -> crate::errors::Result<Vec<f32>> {
            Err(AppError::EmbeddingError {
                message: "connection refused".into(),
            })
        }

        async fn embed_batch(&self, texts: &[String]) -> crate::errors::Result<Vec<Vec<f32>>> {
            self.healthy.embed_batch(texts).await
        }

        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            self.healthy.dimension()
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_fails_the_batch() {
        let embedder = Arc::new(FlakyEmbedder {
            healthy: crate::embeddings::MockEmbedder::new(16),
        });
        let chunk = Chunk::new("fy2021", "reports/fy2021.txt", 0, 0, "total cost: 100");
        let index = CollectionIndex::build("fy2021", vec![chunk], embedder, &IndexBuildOptions::default())
            .await
            .unwrap();
        let mut registry = CollectionRegistry::new();
        registry
            .register(CollectionDescriptor::new("fy2021", "2021"), index)
            .unwrap();

        let router = SubQuestionRouter::new(Arc::new(scripted()), &fast_settings());
        let result = router
            .route(&[SubQuestion::new("fy2021", "cost?")], &registry)
            .await;
        assert!(matches!(result, Err(AppError::EmbeddingError { .. })));
    }

    #[test]
    fn test_answer_prompt_layout() {
        let prompt = answer_prompt("[1] total cost: 100", "What was the total cost?");
        assert!(prompt.starts_with("Context information"));
        assert!(prompt.contains("[1] total cost: 100"));
        assert!(prompt.contains("\nQuestion: What was the total cost?\n"));
    }
}
