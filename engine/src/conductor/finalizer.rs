//! Conductor Finalizer
//!
//! Writes the answer from the outcome log alone. No tools are offered, so
//! everything the answer cites must already be in a step summary.

use crate::conductor::types::StepOutcome;
use crate::llm::{ChatOptions, LLMProvider, Message};
use crate::prompts::PromptLibrary;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub struct Finalizer {
    llm: Arc<dyn LLMProvider>,
    prompts: Arc<PromptLibrary>,
}

impl Finalizer {
    pub fn new(llm: Arc<dyn LLMProvider>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    fn messages(&self, query: &str, outcomes: &[StepOutcome], context: &str) -> Vec<Message> {
        let notes = if outcomes.is_empty() {
            "(no steps were executed)".to_string()
        } else {
            outcomes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let mut user = format!("Question: {}\n\nResearch notes:\n{}", query, notes);
        if !context.is_empty() {
            user.push_str("\n\nEarlier conversation:\n");
            user.push_str(context);
        }

        vec![Message::system(&self.prompts.finalizer), Message::user(user)]
    }

    /// Produce the final answer. Failure here ends the query.
    pub async fn finalize(
        &self,
        query: &str,
        outcomes: &[StepOutcome],
        context: &str,
    ) -> Result<String> {
        let messages = self.messages(query, outcomes, context);
        let response = self
            .llm
            .generate(&messages, &[], ChatOptions::default())
            .await
            .context("Failed to generate the final answer")?;

        let answer = response
            .content
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .context("The model returned an empty final answer")?;

        info!(
            "Final answer ready ({} chars from {} outcome(s))",
            answer.len(),
            outcomes.len()
        );
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::types::{OutcomeReport, OutcomeStatus};
    use crate::llm::{LLMError, LLMResponse, OutputSchema};
    use async_trait::async_trait;
    use serde_json::Value;

    struct Writer(Option<&'static str>);

    #[async_trait]
    impl LLMProvider for Writer {
        fn name(&self) -> &str {
            "writer"
        }

        fn is_local(&self) -> bool {
            true
        }

        async fn generate(
            &self,
            messages: &[Message],
            tools: &[Value],
            _options: ChatOptions,
        ) -> crate::llm::Result<LLMResponse> {
            assert!(tools.is_empty());
            assert!(messages[1].content.contains("src/foo.py:1-20"));
            self.0
                .map(LLMResponse::text)
                .ok_or_else(|| LLMError::AuthenticationFailed("bad key".into()))
        }

        async fn generate_structured(
            &self,
            _messages: &[Message],
            _schema: &OutputSchema,
        ) -> crate::llm::Result<Value> {
            Ok(Value::Null)
        }
    }

    fn outcomes() -> Vec<StepOutcome> {
        vec![StepOutcome::from_report(
            "step_1",
            OutcomeReport {
                status: OutcomeStatus::Completed,
                summary: "class Foo is defined at src/foo.py:1-20".into(),
            },
        )]
    }

    fn finalizer(reply: Option<&'static str>) -> Finalizer {
        Finalizer::new(Arc::new(Writer(reply)), Arc::new(PromptLibrary::default()))
    }

    #[tokio::test]
    async fn test_answer_from_outcomes() {
        let answer = finalizer(Some("  Foo is a class (src/foo.py:1-20).\n"))
            .finalize("What is Foo?", &outcomes(), "")
            .await
            .unwrap();
        assert_eq!(answer, "Foo is a class (src/foo.py:1-20).");
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let err = finalizer(None)
            .finalize("What is Foo?", &outcomes(), "")
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to generate the final answer"));

        let err = finalizer(Some("   "))
            .finalize("What is Foo?", &outcomes(), "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty final answer"));
    }
}
