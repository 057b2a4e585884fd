//! Conductor Executor
//!
//! Runs one plan step as a bounded tool-calling conversation, then asks the
//! model for a structured outcome.
//!
//! The conversation is an explicit state machine:
//!
//! ```text
//! AwaitingModel --tool calls--> ExecutingTools --results--> AwaitingModel
//! AwaitingModel --no calls / error / budget spent--> Done
//! ```
//!
//! Each model turn offers the full tool catalog with a single tool call
//! allowed. Tool failures never escape: the registry renders them as error
//! payloads the model reads on its next turn.

use crate::config::ToolFormat;
use crate::conductor::types::{OutcomeReport, PlanStep, StepOutcome};
use crate::llm::{structured, ChatOptions, LLMProvider, Message, ToolCall};
use crate::prompts::PromptLibrary;
use crate::tools::{truncate_output, ToolRegistry};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Metadata every chunk may carry, as described to the model
const METADATA_FIELDS: &str = "\
- path: file path relative to the indexed repository root
- symbol_name: the function, class or method the chunk defines
- class_name / method_name: enclosing class and method, when applicable
- start_line / end_line: 1-based inclusive line range
- chunk_type: e.g. class, method, function, module
- language: source language";

/// Per-step resource limits
#[derive(Debug, Clone, Copy)]
pub struct StepLimits {
    /// Maximum model turns per step
    pub max_turns: usize,

    /// Tool results longer than this are truncated
    pub max_tool_output_chars: usize,
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            max_turns: 8,
            max_tool_output_chars: 12_000,
        }
    }
}

#[derive(Debug)]
enum TurnState {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done,
}

/// Executes individual plan steps against the tool registry
pub struct StepRunner {
    llm: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptLibrary>,
    tool_format: ToolFormat,
    limits: StepLimits,
}

impl StepRunner {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        prompts: Arc<PromptLibrary>,
        tool_format: ToolFormat,
        limits: StepLimits,
    ) -> Self {
        Self {
            llm,
            tools,
            prompts,
            tool_format,
            limits,
        }
    }

    fn seed_messages(&self, query: &str, step: &PlanStep, prior: &[StepOutcome]) -> Vec<Message> {
        let collections = self.tools.collections().join(", ");
        let developer = format!(
            "Indexed chunks carry this metadata:\n{}\n\n\
             Collections: {}\n\n\
             Tools:\n{}\n\n\
             Cite code as path:start_line-end_line.",
            METADATA_FIELDS,
            collections,
            self.tools.catalog()
        );

        let mut user = format!(
            "Question: {}\n\nCurrent step ({}): {}\n{}",
            query, step.id, step.title, step.description
        );
        if !prior.is_empty() {
            user.push_str("\n\nFindings from earlier steps:\n");
            for outcome in prior {
                user.push_str(&format!("{}\n", outcome));
            }
        }

        vec![
            Message::system(&self.prompts.system),
            Message::developer(developer),
            Message::user(user),
        ]
    }

    /// Execute `step` and return its outcome. Never fails.
    pub async fn run(&self, query: &str, step: &PlanStep, prior: &[StepOutcome]) -> StepOutcome {
        let start = Instant::now();
        let specs = self.tools.specs(self.tool_format);
        let options = ChatOptions {
            single_tool_call: true,
        };

        let mut messages = self.seed_messages(query, step, prior);
        let mut state = TurnState::AwaitingModel;
        let mut turns = 0;
        let mut tool_calls = 0;

        loop {
            state = match state {
                TurnState::AwaitingModel if turns >= self.limits.max_turns => {
                    debug!("Step {} spent its {} turn budget", step.id, turns);
                    TurnState::Done
                }
                TurnState::AwaitingModel => {
                    turns += 1;
                    debug!(
                        "Step {} turn {}/{}",
                        step.id, turns, self.limits.max_turns
                    );

                    match self.llm.generate(&messages, &specs, options).await {
                        Ok(response) if response.has_tool_calls() => {
                            let calls = response.tool_calls.clone();
                            messages.push(Message::assistant_tool_calls(
                                response.content,
                                response.tool_calls,
                            ));
                            TurnState::ExecutingTools(calls)
                        }
                        Ok(response) => {
                            if let Some(text) = response.content.filter(|t| !t.is_empty()) {
                                messages.push(Message::assistant(text));
                            }
                            TurnState::Done
                        }
                        Err(e) => {
                            warn!("Step {} model call failed: {}", step.id, e);
                            TurnState::Done
                        }
                    }
                }
                TurnState::ExecutingTools(calls) => {
                    for call in calls {
                        tool_calls += 1;
                        info!("Step {} calling tool: {}", step.id, call.name);
                        let output = self.tools.dispatch(&call.name, &call.arguments).await;
                        let output = truncate_output(output, self.limits.max_tool_output_chars);
                        messages.push(Message::tool_result(output, call.id));
                    }
                    TurnState::AwaitingModel
                }
                TurnState::Done => break,
            };
        }

        let outcome = self.summarize(step, messages).await;
        info!(
            "Step {} finished as {:?} in {:.1}s ({} turns, {} tool calls)",
            step.id,
            outcome.status,
            start.elapsed().as_secs_f64(),
            turns,
            tool_calls
        );
        outcome
    }

    async fn summarize(&self, step: &PlanStep, mut messages: Vec<Message>) -> StepOutcome {
        messages.push(Message::user(&self.prompts.step_outcome));

        match structured::<OutcomeReport>(self.llm.as_ref(), &messages, "step_outcome").await {
            Ok(report) => StepOutcome::from_report(&step.id, report),
            Err(e) => {
                warn!("Step {} outcome could not be read: {}", step.id, e);
                StepOutcome::failed(&step.id, format!("Step outcome unavailable: {}", e))
            }
        }
    }
}
