//! Conductor Orchestrator
//!
//! Drives one query end to end:
//!
//! 1. Refuse to start if the vector store is unreachable
//! 2. Return a cached answer for a near-identical earlier question
//! 3. Plan, then for each step: run it, record the outcome, evaluate
//! 4. Finalize from the outcome log and persist the exchange
//!
//! The plan is only mutated between step executions. A step is executed at
//! most once, and revisions only ever replace steps after the cursor.

use crate::conductor::evaluator::Evaluator;
use crate::conductor::executor::{StepLimits, StepRunner};
use crate::conductor::finalizer::Finalizer;
use crate::conductor::memory::ConversationMemory;
use crate::conductor::planner::Planner;
use crate::conductor::types::{Decision, QueryReport, StepDraft, StepOutcome, StepStatus};
use crate::config::ToolFormat;
use crate::llm::LLMProvider;
use crate::prompts::PromptLibrary;
use crate::retrieval::CodeRetriever;
use crate::tools::ToolRegistry;
use anyhow::Result;
use sdk::errors::EngineError;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Conductor {
    retriever: Arc<dyn CodeRetriever>,
    planner: Planner,
    runner: StepRunner,
    evaluator: Evaluator,
    finalizer: Finalizer,
    memory: ConversationMemory,
}

impl Conductor {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        retriever: Arc<dyn CodeRetriever>,
        prompts: Arc<PromptLibrary>,
        memory: ConversationMemory,
        tool_format: ToolFormat,
        limits: StepLimits,
    ) -> Self {
        Self {
            retriever,
            planner: Planner::new(llm.clone(), prompts.clone()),
            runner: StepRunner::new(llm.clone(), tools, prompts.clone(), tool_format, limits),
            evaluator: Evaluator::new(llm.clone(), prompts.clone()),
            finalizer: Finalizer::new(llm, prompts),
            memory,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Answer `query`.
    ///
    /// # Errors
    ///
    /// `EngineError::VectorStoreUnavailable` if no collection answers the
    /// health check; any finalizer failure.
    pub async fn ask(&mut self, query: &str) -> Result<QueryReport> {
        if !self.retriever.health_check().await {
            return Err(EngineError::VectorStoreUnavailable(format!(
                "none of the configured collections ({}) answered",
                self.retriever.list_collections().join(", ")
            ))
            .into());
        }

        let embedding = self.memory.embed_query(query).await;
        if let Some(answer) = embedding.as_deref().and_then(|e| self.memory.lookup(e)) {
            return Ok(QueryReport {
                answer: answer.to_string(),
                from_cache: true,
                plan: None,
                outcomes: Vec::new(),
            });
        }

        let context = self.memory.context();
        let mut plan = self.planner.generate_plan(query, &context).await;
        let mut outcomes: Vec<StepOutcome> = Vec::new();
        let mut cursor = 0;

        while let Some(step) = plan.step(cursor).cloned() {
            plan.set_status(cursor, StepStatus::InProgress);
            info!(
                "Step {} ({}/{}) started: {}",
                step.id,
                cursor + 1,
                plan.len(),
                step.title
            );

            let outcome = self.runner.run(query, &step, &outcomes).await;
            plan.set_status(cursor, outcome.status.into());
            outcomes.push(outcome);

            let latest = &outcomes[outcomes.len() - 1];
            let decision = self
                .evaluator
                .evaluate(query, latest, &plan.remaining_titles(cursor))
                .await;

            match decision.decision {
                Decision::Continue => cursor += 1,
                Decision::Finalize => break,
                Decision::Revise => {
                    let new_steps: Vec<StepDraft> = decision
                        .new_steps
                        .unwrap_or_default()
                        .into_iter()
                        .filter(|s| !s.title.trim().is_empty())
                        .collect();
                    info!(
                        "Plan {} revised after {}: {} new step(s)",
                        plan.id,
                        step.id,
                        new_steps.len()
                    );
                    plan.replace_tail(cursor, new_steps);
                    cursor += 1;
                }
            }
        }

        let answer = self.finalizer.finalize(query, &outcomes, &context).await?;

        self.memory.record(query, &answer, embedding).await;
        if let Err(e) = self.memory.persist().await {
            warn!("Conversation history not saved: {:#}", e);
        }

        Ok(QueryReport {
            answer,
            from_cache: false,
            plan: Some(plan),
            outcomes,
        })
    }
}
