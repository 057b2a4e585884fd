//! Conductor Planner
//!
//! Turns the user's question into an ordered list of research steps.

use crate::conductor::types::{Plan, PlanDraft, StepDraft};
use crate::llm::{structured, LLMProvider, Message};
use crate::prompts::PromptLibrary;
use std::sync::Arc;
use tracing::{info, warn};

/// Upper bound on planned steps; extra steps are dropped
const MAX_PLANNED_STEPS: usize = 8;

pub struct Planner {
    llm: Arc<dyn LLMProvider>,
    prompts: Arc<PromptLibrary>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LLMProvider>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    /// Produce a plan for `query`.
    ///
    /// Never fails: when the model is unreachable or returns something that
    /// is not a usable plan, a single step covering the whole question is
    /// used instead.
    pub async fn generate_plan(&self, query: &str, context: &str) -> Plan {
        let mut user = format!("Question: {}", query);
        if !context.is_empty() {
            user.push_str("\n\nEarlier conversation:\n");
            user.push_str(context);
        }
        let messages = [Message::system(&self.prompts.planner), Message::user(user)];

        let drafts = match structured::<PlanDraft>(self.llm.as_ref(), &messages, "plan").await {
            Ok(draft) => Self::clean(draft.steps),
            Err(e) => {
                warn!("Planner failed, falling back to a single step: {}", e);
                Vec::new()
            }
        };

        let plan = if drafts.is_empty() {
            Self::default_plan(query)
        } else {
            Plan::with_steps(query, drafts)
        };

        info!("Plan {} created with {} step(s)", plan.id, plan.len());
        plan
    }

    fn clean(steps: Vec<StepDraft>) -> Vec<StepDraft> {
        steps
            .into_iter()
            .filter(|s| !s.title.trim().is_empty())
            .take(MAX_PLANNED_STEPS)
            .collect()
    }

    /// One step that answers the whole question
    pub fn default_plan(query: &str) -> Plan {
        Plan::with_steps(
            query,
            vec![StepDraft::new(
                "Answer the question",
                format!("Find the code relevant to: {}", query),
            )],
        )
    }
}
