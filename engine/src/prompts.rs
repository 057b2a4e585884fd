//! Prompt library
//!
//! Built-in prompts for every model-facing role. Any of them can be replaced
//! by a file named in `[prompts]`; overrides are read once at startup and the
//! library is shared by `Arc` afterwards.

use crate::config::PromptsConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

const SYSTEM: &str = "\
You are Sonar, a code-research agent working on ONE step of a larger plan.
You answer questions about an indexed codebase using retrieval tools only.

Rules:
- Call at most one tool per turn. Read its result before deciding the next call.
- Prefer symbol_search for named classes, methods and functions; regex_search
  for exact identifiers or literals; semantic_search for behaviour described
  in words; get_file once you know which file matters.
- Never invent code, paths or line numbers. Everything you report must come
  from a tool result.
- When a tool returns an error, read it and correct your call.
- Stop calling tools as soon as the step is answered.";

const PLANNER: &str = "\
You plan how to answer a question about an indexed codebase.
Break the question into 1 to 5 ordered research steps. Each step must be
answerable with code search tools (symbol search, regex search, semantic
search, whole-file retrieval). Keep steps concrete: name the symbols, files
or behaviours to look for. Do not include a step that writes the final
answer; that happens separately.

Return JSON with a `steps` array of objects with `title` and `description`.";

const EVALUATOR: &str = "\
You supervise a research plan. Given the outcome of the step that just ran and
the titles of the steps still pending, decide what happens next:
- \"continue\": the remaining steps still make sense.
- \"finalize\": enough is known to answer the question now.
- \"revise\": the remaining steps should be replaced. Provide `new_steps` as
  objects with `title` and `description`. An empty list drops them all.

Return JSON with `decision`, `reason` and optionally `new_steps`.";

const FINALIZER: &str = "\
You write the final answer to a question about a codebase, using ONLY the
research notes provided. Do not speculate beyond them.
Cite every code location you rely on as `path:start-end`, exactly as it
appears in the notes. If the notes do not answer the question, say so and
state what was found instead.";

const STEP_OUTCOME: &str = "\
Summarize what this step established. Include every relevant code location
as `path:start-end` together with what it shows. Set `status` to
\"completed\" if the step's goal was met and \"failed\" otherwise.

Return JSON with `status` and `summary`.";

const SUMMARIZER: &str = "\
Condense the following conversation turns into a short digest that preserves
the questions asked, the answers given and any code locations cited.
Write plain prose, no more than a few sentences per exchange.";

/// Every prompt the conductor sends, resolved once
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    pub system: String,
    pub planner: String,
    pub evaluator: String,
    pub finalizer: String,
    pub step_outcome: String,
    pub summarizer: String,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self {
            system: SYSTEM.to_string(),
            planner: PLANNER.to_string(),
            evaluator: EVALUATOR.to_string(),
            finalizer: FINALIZER.to_string(),
            step_outcome: STEP_OUTCOME.to_string(),
            summarizer: SUMMARIZER.to_string(),
        }
    }
}

fn read_override(path: &Option<std::path::PathBuf>, slot: &mut String, name: &str) -> Result<()> {
    let Some(path) = path.as_deref() else {
        return Ok(());
    };
    *slot = read_prompt(path).with_context(|| format!("Failed to load {} prompt", name))?;
    info!("Loaded {} prompt from {}", name, path.display());
    Ok(())
}

fn read_prompt(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("{} is empty", path.display());
    }
    Ok(text.to_string())
}

impl PromptLibrary {
    /// Built-in prompts with the configured overrides applied.
    pub fn load(config: &PromptsConfig) -> Result<Self> {
        let mut library = Self::default();
        read_override(&config.system, &mut library.system, "system")?;
        read_override(&config.planner, &mut library.planner, "planner")?;
        read_override(&config.evaluator, &mut library.evaluator, "evaluator")?;
        read_override(&config.finalizer, &mut library.finalizer, "finalizer")?;
        read_override(
            &config.step_outcome,
            &mut library.step_outcome,
            "step_outcome",
        )?;
        read_override(&config.summarizer, &mut library.summarizer, "summarizer")?;
        Ok(library)
    }
}
