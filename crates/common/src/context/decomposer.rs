//! Question decomposition
//!
//! Asks the language model to split a question into sub-questions, each
//! addressed to one registered collection. Model output is treated as
//! untrusted: anything unparseable or naming an unknown collection is
//! dropped rather than failing the query.

use regex_lite::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::PipelineSettings;
use crate::errors::Result;
use crate::llm::{CompletionOptions, LanguageModel};
use crate::models::{CollectionDescriptor, SubQuestion};
use crate::resilience::bounded;

const DECOMPOSITION_SYSTEM_PROMPT: &str =
    "You break complex questions about financial reports into simpler sub-questions.";

/// One entry of the model's JSON output
#[derive(Debug, Deserialize)]
struct ProposedSubQuestion {
    #[serde(alias = "tool_name")]
    collection: String,
    #[serde(alias = "sub_question")]
    question: String,
}

/// Splits a question into per-collection sub-questions
pub struct QuestionDecomposer {
    llm: Arc<dyn LanguageModel>,
    options: CompletionOptions,
    timeout: Duration,
}

impl QuestionDecomposer {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: &PipelineSettings) -> Self {
        Self {
            llm,
            options: settings
                .completion
                .clone()
                .with_system_prompt(DECOMPOSITION_SYSTEM_PROMPT),
            timeout: settings.llm_timeout,
        }
    }

    /// Decompose `question` against the given collections.
    ///
    /// An empty result is a normal outcome: the question should be answered
    /// without decomposition. Provider failures and timeouts propagate.
    #[instrument(skip(self, question, descriptors), fields(collections = descriptors.len()))]
    pub async fn decompose(
        &self,
        question: &str,
        descriptors: &[CollectionDescriptor],
    ) -> Result<Vec<SubQuestion>> {
        if descriptors.is_empty() {
            debug!("No collections registered, skipping decomposition");
            return Ok(Vec::new());
        }

        let prompt = build_prompt(question, descriptors);
        let raw = bounded(
            "decomposition",
            self.timeout,
            self.llm.complete(&prompt, &self.options),
        )
        .await?;

        let Some(proposed) = parse_proposals(&raw) else {
            warn!(output_len = raw.len(), "Decomposition output was not a JSON list, answering without sub-questions");
            return Ok(Vec::new());
        };

        let known: HashSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        let mut sub_questions = Vec::with_capacity(proposed.len());

        for item in proposed {
            let collection = item.collection.trim();
            let text = item.question.trim();

            if !known.contains(collection) {
                warn!(collection, "Decomposer named an unknown collection, dropping sub-question");
                continue;
            }
            if text.is_empty() {
                warn!(collection, "Decomposer produced an empty sub-question, dropping it");
                continue;
            }

            info!(collection, sub_question = text, "Generated sub-question");
            sub_questions.push(SubQuestion::new(collection, text));
        }

        Ok(sub_questions)
    }
}

fn build_prompt(question: &str, descriptors: &[CollectionDescriptor]) -> String {
    let mut prompt = String::from(
        "You have access to the following document collections. Each one can only \
         answer questions about its own contents.\n\n",
    );

    for descriptor in descriptors {
        prompt.push_str(&format!("- {}: {}\n", descriptor.name, descriptor.description));
    }

    prompt.push_str(
        "\nSplit the user question into the sub-questions needed to answer it. Address each \
         sub-question to exactly one collection from the list above, using its exact name. \
         Only use the collections that are relevant. If the question does not need any \
         collection, return an empty array.\n\
         Output a JSON array of objects with the keys \"collection\" and \"question\" and nothing else.\n\n",
    );
    prompt.push_str(&format!("User question: {}\n", question));
    prompt
}

/// Code fence around the model's answer, with an optional language tag
fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*\n?(.*?)```").ok())
        .as_ref()
}

/// Extract the JSON array from model output, tolerating prose and code fences around it.
///
/// The first `[` that starts a well-formed array of objects wins. Entries that
/// do not have the expected shape are dropped one by one.
fn parse_proposals(raw: &str) -> Option<Vec<ProposedSubQuestion>> {
    let body = fence_pattern()
        .and_then(|fence| fence.captures(raw))
        .and_then(|captures| captures.get(1))
        .map_or(raw, |m| m.as_str());

    let items = find_json_array(body).or_else(|| find_json_array(raw))?;

    let proposals = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ProposedSubQuestion>(item) {
            Ok(proposal) => Some(proposal),
            Err(e) => {
                warn!(error = %e, "Malformed sub-question entry, dropping it");
                None
            }
        })
        .collect();

    Some(proposals)
}

fn find_json_array(text: &str) -> Option<Vec<Value>> {
    text.match_indices('[').find_map(|(start, _)| {
        let items = serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<Vec<Value>>()
            .next()?
            .ok()?;
        let is_list_of_objects = items.is_empty() || items.iter().any(Value::is_object);
        is_list_of_objects.then_some(items)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::fast_settings;
    use crate::errors::AppError;
    use crate::llm::ScriptedLanguageModel;

    fn descriptors() -> Vec<CollectionDescriptor> {
        vec![
            CollectionDescriptor::new("fy2021", "Financial report for fiscal year 2021"),
            CollectionDescriptor::new("fy2022", "Financial report for fiscal year 2022"),
        ]
    }

    fn decomposer(reply: &str) -> QuestionDecomposer {
        let llm = ScriptedLanguageModel::new().when(&["Output a JSON array"], reply);
        QuestionDecomposer::new(Arc::new(llm), &fast_settings())
    }

    #[tokio::test]
    async fn test_decomposes_into_known_collections() {
        let decomposer = decomposer(
            r#"[{"collection": "fy2021", "question": "What was the total cost in 2021?"},
                {"collection": "fy2022", "question": "What was the total cost in 2022?"}]"#,
        );
        let result = decomposer
            .decompose("compare total cost", &descriptors())
            .await
            .unwrap();

        assert_eq!(
            result,
            vec![
                SubQuestion::new("fy2021", "What was the total cost in 2021?"),
                SubQuestion::new("fy2022", "What was the total cost in 2022?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_prompt_lists_collections_in_order() {
        let llm = Arc::new(ScriptedLanguageModel::new().otherwise("[]"));
        let decomposer = QuestionDecomposer::new(llm.clone(), &fast_settings());
        decomposer.decompose("anything", &descriptors()).await.unwrap();

        let prompt = &llm.prompts()[0];
        let first = prompt.find("fy2021").unwrap();
        let second = prompt.find("fy2022").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Financial report for fiscal year 2022"));
        assert!(prompt.contains("User question: anything"));
    }

    #[tokio::test]
    async fn test_fenced_output_and_aliases() {
        let decomposer = decomposer(
            "Here you go:\n```json\n[{\"tool_name\": \"fy2022\", \"sub_question\": \"Revenue in 2022?\"}]\n```",
        );
        let result = decomposer.decompose("revenue", &descriptors()).await.unwrap();
        assert_eq!(result, vec![SubQuestion::new("fy2022", "Revenue in 2022?")]);
    }

    #[tokio::test]
    async fn test_bracketed_prose_around_array() {
        let reply = "```json\n\
            [{\"collection\": \"fy2021\", \"question\": \"Total cost in 2021?\"},\n\
             {\"collection\": \"fy2022\", \"question\": \"Total cost in 2022?\"}]\n\
            ```\n\
            Both sub-questions use the [executive summary] tools.";
        let result = decomposer(reply).decompose("compare", &descriptors()).await.unwrap();
        assert_eq!(result.len(), 2);

        let reply = "See [1] below.\n\
            [{\"collection\": \"fy2022\", \"question\": \"Revenue in 2022?\"}]\n\
            Sources: [fy2022]";
        let result = decomposer(reply).decompose("revenue", &descriptors()).await.unwrap();
        assert_eq!(result, vec![SubQuestion::new("fy2022", "Revenue in 2022?")]);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_dropped_alone() {
        let decomposer = decomposer(
            r#"[{"collection": "fy2021"},
                {"collection": "fy2022", "question": "Costs in 2022?"}]"#,
        );
        let result = decomposer.decompose("costs", &descriptors()).await.unwrap();
        assert_eq!(result, vec![SubQuestion::new("fy2022", "Costs in 2022?")]);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_dropped() {
        let decomposer = decomposer(
            r#"[{"collection": "fy1999", "question": "Old costs?"},
                {"collection": "fy2021", "question": "Costs in 2021?"}]"#,
        );
        let result = decomposer.decompose("costs", &descriptors()).await.unwrap();
        assert_eq!(result, vec![SubQuestion::new("fy2021", "Costs in 2021?")]);
    }

    #[tokio::test]
    async fn test_same_collection_sub_questions_are_kept() {
        let decomposer = decomposer(
            r#"[{"collection": "fy2021", "question": "Costs in 2021?"},
                {"collection": "fy2021", "question": "Revenue in 2021?"}]"#,
        );
        let result = decomposer.decompose("costs and revenue", &descriptors()).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_and_unparseable_output() {
        assert!(decomposer("[]").decompose("hello", &descriptors()).await.unwrap().is_empty());
        assert!(decomposer("I cannot help with that.")
            .decompose("hello", &descriptors())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_no_descriptors_skips_model() {
        let llm = Arc::new(ScriptedLanguageModel::new());
        let decomposer = QuestionDecomposer::new(llm.clone(), &fast_settings());
        assert!(decomposer.decompose("anything", &[]).await.unwrap().is_empty());
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let llm = ScriptedLanguageModel::new().fail_when(&["Output a JSON array"], "unreachable");
        let decomposer = QuestionDecomposer::new(Arc::new(llm), &fast_settings());
        assert!(matches!(
            decomposer.decompose("anything", &descriptors()).await,
            Err(AppError::LanguageModel { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_propagates() {
        let llm = ScriptedLanguageModel::new().when_slow(
            &["Output a JSON array"],
            "[]",
            Duration::from_millis(200),
        );
        let settings = PipelineSettings {
            llm_timeout: Duration::from_millis(20),
            ..fast_settings()
        };
        let decomposer = QuestionDecomposer::new(Arc::new(llm), &settings);
        assert!(matches!(
            decomposer.decompose("anything", &descriptors()).await,
            Err(AppError::ProviderTimeout { .. })
        ));
    }
}
