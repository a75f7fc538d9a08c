//! Single entry point for answering questions

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};

use super::{
    AnswerSynthesizer, Fallback, PipelineSettings, QuestionDecomposer, SubQuestionRouter,
};
use crate::config::{AppConfig, FallbackPolicy};
use crate::errors::{AppError, Result};
use crate::llm::LanguageModel;
use crate::metrics;
use crate::models::FinalAnswer;
use crate::retrieval::CollectionRegistry;

/// Decompose, route and synthesize, in that order.
///
/// Built once at startup and shared by reference with the request layer.
pub struct QueryFacade {
    registry: Arc<CollectionRegistry>,
    decomposer: QuestionDecomposer,
    router: SubQuestionRouter,
    synthesizer: AnswerSynthesizer,
    budget: Duration,
}

impl QueryFacade {
    /// Build the pipeline from configuration.
    ///
    /// Fails when the fallback policy names a collection missing from `registry`.
    pub fn new(
        config: &AppConfig,
        registry: Arc<CollectionRegistry>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        Self::with_settings(
            PipelineSettings::from_config(config),
            &config.retrieval.fallback,
            registry,
            llm,
        )
    }

    pub fn with_settings(
        settings: PipelineSettings,
        fallback: &FallbackPolicy,
        registry: Arc<CollectionRegistry>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let fallback = Fallback::resolve(fallback, &registry)?;

        Ok(Self {
            decomposer: QuestionDecomposer::new(llm.clone(), &settings),
            router: SubQuestionRouter::new(llm.clone(), &settings),
            synthesizer: AnswerSynthesizer::new(llm, &settings, fallback),
            budget: settings.query_budget(),
            registry,
        })
    }

    /// Answer one question.
    ///
    /// Per-sub-question problems are absorbed as degraded sub-answers;
    /// decomposition and synthesis failures are returned. The whole call is
    /// bounded by the sum of the stage budgets.
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    pub async fn answer(&self, question: &str) -> Result<FinalAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::invalid_argument("question must not be empty"));
        }

        let started = Instant::now();
        let outcome = crate::resilience::bounded("query", self.budget, self.run(question)).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &outcome {
            Ok(answer) => {
                let degraded = answer.sub_answers.iter().filter(|a| a.is_degraded()).count();
                info!(
                    sub_answers = answer.sub_answers.len(),
                    degraded,
                    used_fallback = answer.used_fallback,
                    elapsed_ms = (elapsed * 1000.0) as u64,
                    "Question answered"
                );
                metrics::record_question(elapsed, answer.sub_answers.len(), answer.used_fallback, true);
            }
            Err(e) => {
                error!(error = %e, "Question failed");
                metrics::record_question(elapsed, 0, false, false);
            }
        }

        outcome
    }

    async fn run(&self, question: &str) -> Result<FinalAnswer> {
        let descriptors = self.registry.list_descriptors();
        let sub_questions = self.decomposer.decompose(question, &descriptors).await?;
        let sub_answers = self.router.route(&sub_questions, &self.registry).await?;
        self.synthesizer.synthesize(question, sub_answers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{fast_settings, registry_of};
    use crate::llm::ScriptedLanguageModel;

    const DECOMPOSITION: &str = r#"```json
[
  {"collection": "fy2021", "question": "What was the total cost in fy2021?"},
  {"collection": "fy2022", "question": "What was the total cost in fy2022?"}
]
```"#;

    fn scripted() -> ScriptedLanguageModel {
        ScriptedLanguageModel::new()
            .when(
                &["Sub-question answers", "total cost was 100", "total cost was 120"],
                "Total cost was 100 in fy2021 and 120 in fy2022, an increase of 20.",
            )
            .when(&["Output a JSON array"], DECOMPOSITION)
            .when(&["Context information", "total cost: 100"], "The fy2021 total cost was 100.")
            .when(&["Context information", "total cost: 120"], "The fy2022 total cost was 120.")
    }

    async fn facade(llm: ScriptedLanguageModel) -> QueryFacade {
        let registry = registry_of(&[("fy2021", "total cost: 100"), ("fy2022", "total cost: 120")]).await;
        QueryFacade::with_settings(fast_settings(), &FallbackPolicy::NoContext, registry, Arc::new(llm))
            .unwrap()
    }

    #[tokio::test]
    async fn test_compares_two_collections_end_to_end() {
        let facade = facade(scripted()).await;

        let answer = tokio_test::assert_ok!(
            facade
                .answer("compare total cost between fy2021 and fy2022")
                .await
        );

        assert!(!answer.used_fallback);
        assert_eq!(answer.sub_answers.len(), 2);
        assert_eq!(answer.sub_answers[0].source_collection(), "fy2021");
        assert!(answer.sub_answers[0].text.contains("100"));
        assert_eq!(answer.sub_answers[1].source_collection(), "fy2022");
        assert!(answer.sub_answers[1].text.contains("120"));
        assert!(answer.text.contains("100"));
        assert!(answer.text.contains("120"));
    }

    #[tokio::test]
    async fn test_bogus_collection_from_decomposer_is_absorbed() {
        let llm = ScriptedLanguageModel::new()
            .when(&["Sub-question answers"], "Only fy2021 data was available: 100.")
            .when(
                &["Output a JSON array"],
                r#"[{"collection": "fy2030", "question": "Costs?"},
                    {"collection": "fy2021", "question": "Costs?"}]"#,
            )
            .when(&["Context information", "total cost: 100"], "The fy2021 total cost was 100.");
        let facade = facade(llm).await;

        let answer = facade.answer("costs across years").await.unwrap();
        assert_eq!(answer.sub_answers.len(), 1);
        assert!(answer.text.contains("100"));
    }

    #[tokio::test]
    async fn test_empty_decomposition_uses_fallback() {
        let llm = ScriptedLanguageModel::new()
            .when(&["Output a JSON array"], "[]")
            .otherwise("Hello! Ask me about the financial reports.");
        let facade = facade(llm).await;

        let answer = facade.answer("hi there").await.unwrap();
        assert!(answer.used_fallback);
        assert!(answer.sub_answers.is_empty());
        assert!(!answer.text.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_blank_question() {
        let facade = facade(scripted()).await;
        assert!(matches!(
            facade.answer("   ").await,
            Err(AppError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_decomposition_failure_is_query_level() {
        let llm = ScriptedLanguageModel::new().fail_when(&["Output a JSON array"], "unreachable");
        let facade = facade(llm).await;

        let err = facade.answer("compare costs").await.unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(err.user_message(), crate::errors::RETRY_MESSAGE);
    }

    #[tokio::test]
    async fn test_unknown_fallback_collection_rejected() {
        let registry = registry_of(&[("fy2021", "total cost: 100")]).await;
        let result = QueryFacade::with_settings(
            fast_settings(),
            &FallbackPolicy::DefaultCollection("fy1999".into()),
            registry,
            Arc::new(ScriptedLanguageModel::new()),
        );
        assert!(matches!(result, Err(AppError::UnknownCollection { .. })));
    }
}
