//! Conductor Evaluator
//!
//! After each step, decides whether the plan continues as is, stops early
//! for the final answer, or has its pending steps replaced.

use crate::conductor::types::{Decision, PlanDecision, StepOutcome};
use crate::llm::{structured, LLMProvider, Message};
use crate::prompts::PromptLibrary;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Evaluator {
    llm: Arc<dyn LLMProvider>,
    prompts: Arc<PromptLibrary>,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LLMProvider>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    /// Decide what follows `latest`.
    ///
    /// Only the latest outcome and the titles of the pending steps are shown
    /// to the model. Any failure yields `continue`.
    pub async fn evaluate(
        &self,
        query: &str,
        latest: &StepOutcome,
        remaining: &[String],
    ) -> PlanDecision {
        let pending = if remaining.is_empty() {
            "(none)".to_string()
        } else {
            remaining
                .iter()
                .map(|t| format!("- {}", t))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let user = format!(
            "Question: {}\n\nLatest step outcome:\n{}\n\nPending steps:\n{}",
            query, latest, pending
        );
        let messages = [
            Message::system(&self.prompts.evaluator),
            Message::user(user),
        ];

        let decision =
            match structured::<PlanDecision>(self.llm.as_ref(), &messages, "plan_decision").await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!("Evaluator failed, continuing with the plan: {}", e);
                    PlanDecision::proceed("evaluator unavailable")
                }
            };

        info!(
            "After {}: {:?} ({})",
            latest.step_id, decision.decision, decision.reason
        );
        if decision.decision == Decision::Revise && decision.new_steps.is_none() {
            info!("Revision without new steps drops the pending steps");
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatOptions, LLMError, LLMResponse, OutputSchema};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct Judge {
        reply: Option<Value>,
        prompt: Mutex<String>,
    }

    #[async_trait]
    impl LLMProvider for Judge {
        fn name(&self) -> &str {
            "judge"
        }

        fn is_local(&self) -> bool {
            true
        }

        async fn generate(
            &self,
            _messages: &[Message],
            _tools: &[Value],
            _options: ChatOptions,
        ) -> crate::llm::Result<LLMResponse> {
            Ok(LLMResponse::default())
        }

        async fn generate_structured(
            &self,
            messages: &[Message],
            _schema: &OutputSchema,
        ) -> crate::llm::Result<Value> {
            *self.prompt.lock().unwrap() = messages[1].content.clone();
            self.reply.clone().ok_or(LLMError::Timeout)
        }
    }

    fn setup(reply: Option<Value>) -> (Arc<Judge>, Evaluator) {
        let judge = Arc::new(Judge {
            reply,
            prompt: Mutex::new(String::new()),
        });
        let evaluator = Evaluator::new(judge.clone(), Arc::new(PromptLibrary::default()));
        (judge, evaluator)
    }

    fn outcome() -> StepOutcome {
        StepOutcome::failed("step_1", "nothing in src/")
    }

    #[tokio::test]
    async fn test_sees_only_latest_outcome_and_pending_titles() {
        let (judge, evaluator) = setup(Some(json!({"decision": "finalize", "reason": "done"})));
        let decision = evaluator
            .evaluate("q", &outcome(), &["Read tests".to_string()])
            .await;

        assert_eq!(decision.decision, Decision::Finalize);
        let prompt = judge.prompt.lock().unwrap();
        assert!(prompt.contains("[step_1] (failed) nothing in src/"));
        assert!(prompt.contains("- Read tests"));
    }

    #[tokio::test]
    async fn test_failure_means_continue() {
        let (_, evaluator) = setup(None);
        let decision = evaluator.evaluate("q", &outcome(), &[]).await;
        assert_eq!(decision.decision, Decision::Continue);

        let (_, evaluator) = setup(Some(json!({"decision": "maybe"})));
        let decision = evaluator.evaluate("q", &outcome(), &[]).await;
        assert_eq!(decision.decision, Decision::Continue);
    }
}
