//! Conductor System
//!
//! Plans a query, runs each step through a bounded tool-calling loop,
//! re-plans when the evaluator asks for it, and writes the final answer.

pub mod evaluator;
pub mod executor;
pub mod finalizer;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod types;

pub use evaluator::Evaluator;
pub use executor::{StepLimits, StepRunner};
pub use finalizer::Finalizer;
pub use memory::{ConversationMemory, ConversationTurn, TurnRole};
pub use orchestrator::Conductor;
pub use planner::Planner;
pub use types::{
    Decision, OutcomeStatus, Plan, PlanDecision, PlanStep, QueryReport, StepDraft, StepOutcome,
    StepStatus,
};
