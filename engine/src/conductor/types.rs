//! Conductor data model
//!
//! Plans and steps are owned by the orchestrator for one query. Outcomes are
//! append-only. Decisions are transient. The `*Draft` and `*Report` types are
//! what the model produces through structured output; the orchestrator turns
//! them into the owned types here, assigning ids itself.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one plan step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: StepStatus,
}

/// A step as proposed by the planner or evaluator, before it has an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StepDraft {
    /// Short imperative title
    pub title: String,

    /// What to look for and how
    #[serde(default)]
    pub description: String,
}

impl StepDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Planner output
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PlanDraft {
    /// Ordered research steps
    pub steps: Vec<StepDraft>,
}

/// Ordered steps for one query.
///
/// The plan assigns every step a fresh `step_<n>` id from its own counter, so
/// ids stay unique across revisions.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: String,
    pub query: String,
    steps: Vec<PlanStep>,
    #[serde(skip)]
    next_id: usize,
}

impl Plan {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            steps: Vec::new(),
            next_id: 1,
        }
    }

    pub fn with_steps(query: impl Into<String>, drafts: Vec<StepDraft>) -> Self {
        let mut plan = Self::new(query);
        for draft in drafts {
            plan.push_step(draft);
        }
        plan
    }

    /// Append a pending step with the next id
    pub fn push_step(&mut self, draft: StepDraft) -> &PlanStep {
        let id = format!("step_{}", self.next_id);
        self.next_id += 1;
        self.steps.push(PlanStep {
            id,
            title: draft.title,
            description: draft.description,
            status: StepStatus::Pending,
        });
        &self.steps[self.steps.len() - 1]
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&PlanStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn set_status(&mut self, index: usize, status: StepStatus) {
        if let Some(step) = self.steps.get_mut(index) {
            step.status = status;
        }
    }

    /// Titles of the steps after `cursor`
    pub fn remaining_titles(&self, cursor: usize) -> Vec<String> {
        self.steps
            .iter()
            .skip(cursor + 1)
            .map(|s| s.title.clone())
            .collect()
    }

    /// Replace every step after `cursor` with `drafts`.
    ///
    /// Steps up to and including `cursor` are untouched. An empty `drafts`
    /// truncates the plan at the cursor.
    pub fn replace_tail(&mut self, cursor: usize, drafts: Vec<StepDraft>) {
        self.steps.truncate(cursor + 1);
        for draft in drafts {
            self.push_step(draft);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Completed,
    Failed,
}

impl From<OutcomeStatus> for StepStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Completed => StepStatus::Completed,
            OutcomeStatus::Failed => StepStatus::Failed,
        }
    }
}

/// What the model reports at the end of a step
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct OutcomeReport {
    /// "completed" if the step's goal was met, "failed" otherwise
    pub status: OutcomeStatus,

    /// Findings, citing code locations as path:start-end
    pub summary: String,
}

/// Recorded result of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub status: OutcomeStatus,
    pub summary: String,
}

impl StepOutcome {
    pub fn from_report(step_id: impl Into<String>, report: OutcomeReport) -> Self {
        Self {
            step_id: step_id.into(),
            status: report.status,
            summary: report.summary,
        }
    }

    pub fn failed(step_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: OutcomeStatus::Failed,
            summary: summary.into(),
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            OutcomeStatus::Completed => "completed",
            OutcomeStatus::Failed => "failed",
        };
        write!(f, "[{}] ({}) {}", self.step_id, status, self.summary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Continue,
    Finalize,
    Revise,
}

/// Evaluator output
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct PlanDecision {
    pub decision: Decision,

    /// One sentence on why
    #[serde(default)]
    pub reason: String,

    /// Replacement for the pending steps; only read when revising
    #[serde(default)]
    pub new_steps: Option<Vec<StepDraft>>,
}

impl PlanDecision {
    pub fn proceed(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Continue,
            reason: reason.into(),
            new_steps: None,
        }
    }
}

/// Everything one query produced
#[derive(Debug, Clone)]
pub struct QueryReport {
    pub answer: String,

    /// True when the answer came from the conversation cache
    pub from_cache: bool,

    /// Final state of the plan; `None` on a cache hit
    pub plan: Option<Plan>,

    pub outcomes: Vec<StepOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drafts(titles: &[&str]) -> Vec<StepDraft> {
        titles.iter().map(|t| StepDraft::new(*t, "")).collect()
    }

    #[test]
    fn test_plan_assigns_sequential_ids() {
        let plan = Plan::with_steps("q", drafts(&["a", "b", "c"]));
        let ids: Vec<_> = plan.steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["step_1", "step_2", "step_3"]);
        assert!(plan.steps().iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn test_replace_tail_keeps_prefix_and_never_reuses_ids() {
        let mut plan = Plan::with_steps("q", drafts(&["a", "b", "c"]));
        plan.set_status(0, StepStatus::Completed);

        plan.replace_tail(0, drafts(&["x", "y"]));
        let ids: Vec<_> = plan.steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["step_1", "step_4", "step_5"]);
        assert_eq!(plan.steps()[0].title, "a");
        assert_eq!(plan.steps()[0].status, StepStatus::Completed);
    }

    #[test]
    fn test_replace_tail_with_nothing_truncates() {
        let mut plan = Plan::with_steps("q", drafts(&["a", "b", "c"]));
        plan.replace_tail(1, Vec::new());
        assert_eq!(plan.len(), 2);
        assert!(plan.remaining_titles(1).is_empty());
    }

    #[test]
    fn test_decision_parsing() {
        let decision: PlanDecision = serde_json::from_str(
            r#"{"decision": "revise", "reason": "wrong file", "new_steps": [{"title": "look in utils"}]}"#,
        )
        .unwrap();
        assert_eq!(decision.decision, Decision::Revise);
        assert_eq!(decision.new_steps.unwrap()[0].description, "");

        let bare: PlanDecision = serde_json::from_str(r#"{"decision": "finalize"}"#).unwrap();
        assert_eq!(bare.decision, Decision::Finalize);
        assert!(bare.new_steps.is_none());
    }

    #[test]
    fn test_outcome_display() {
        let outcome = StepOutcome::failed("step_2", "nothing found");
        assert_eq!(outcome.to_string(), "[step_2] (failed) nothing found");
    }
}
