//! Conversation Memory
//!
//! Persists question/answer turns across invocations as one JSON document,
//! reuses an earlier answer when a new question embeds close enough to an
//! old one, and folds old turns into a rolling summary instead of dropping
//! them silently.
//!
//! The document is read once at startup and rewritten wholesale after each
//! completed query. Two concurrent `sonar` processes sharing a history file
//! will overwrite each other.

use crate::config::MemoryConfig;
use crate::llm::embedding::Embedder;
use crate::llm::{ChatOptions, LLMProvider, Message};
use crate::prompts::PromptLibrary;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Average characters per token (rough estimate: 1 token ≈ 4 characters)
const CHARS_PER_TOKEN: usize = 4;

/// Per-turn structural overhead in tokens
const TURN_OVERHEAD_TOKENS: usize = 10;

/// Characters kept per turn by the extractive digest
const EXTRACT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    /// Embedding of a user question, used by the answer cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Already folded into the summary
    #[serde(default)]
    pub summarized: bool,
}

impl ConversationTurn {
    fn new(role: TurnRole, content: impl Into<String>, embedding: Option<Vec<f32>>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            embedding,
            summarized: false,
        }
    }

    fn estimate_tokens(&self) -> usize {
        self.content.len().div_ceil(CHARS_PER_TOKEN) + TURN_OVERHEAD_TOKENS
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryDocument {
    #[serde(default)]
    turns: Vec<ConversationTurn>,

    #[serde(default)]
    summary: String,
}

/// Cosine similarity; 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lossy digest used when the model cannot summarize
fn extractive_digest(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, truncate_chars(&t.content, EXTRACT_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ConversationMemory {
    config: MemoryConfig,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LLMProvider>,
    prompts: Arc<PromptLibrary>,
    doc: HistoryDocument,
}

impl ConversationMemory {
    /// Load the history at `config.history_path`. A missing file is an empty
    /// history; disabled memory never touches the disk.
    pub async fn load(
        config: MemoryConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LLMProvider>,
        prompts: Arc<PromptLibrary>,
    ) -> Result<Self> {
        let doc = if config.enabled {
            Self::read_document(&config.history_path).await?
        } else {
            debug!("Conversation memory disabled");
            HistoryDocument::default()
        };

        Ok(Self {
            config,
            embedder,
            llm,
            prompts,
            doc,
        })
    }

    async fn read_document(path: &Path) -> Result<HistoryDocument> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history at {}, starting fresh", path.display());
                return Ok(HistoryDocument::default());
            }
            Err(e) => {
                return Err(EngineError::History(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                ))
                .into())
            }
        };

        let doc: HistoryDocument = serde_json::from_str(&raw).map_err(|e| {
            EngineError::History(format!(
                "{} is corrupt ({}); delete it to start over",
                path.display(),
                e
            ))
        })?;
        debug!("Loaded {} turn(s) from {}", doc.turns.len(), path.display());
        Ok(doc)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.doc.turns
    }

    pub fn summary(&self) -> &str {
        &self.doc.summary
    }

    /// Embed a question for the cache. `None` when memory is disabled or
    /// embedding fails; either way the query proceeds without the cache.
    pub async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        if !self.config.enabled {
            return None;
        }
        match self.embedder.embed(query).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!("Query embedding failed, skipping the answer cache: {}", e);
                None
            }
        }
    }

    /// Answer to the most similar earlier question, if that similarity is
    /// strictly above the threshold and the question was answered.
    pub fn lookup(&self, embedding: &[f32]) -> Option<&str> {
        if !self.config.enabled {
            return None;
        }

        let turns = &self.doc.turns;
        let (best, similarity) = turns
            .iter()
            .enumerate()
            .filter(|(_, t)| t.role == TurnRole::User)
            .filter_map(|(i, t)| {
                t.embedding
                    .as_deref()
                    .map(|e| (i, cosine_similarity(embedding, e)))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))?;

        if similarity <= self.config.cache_similarity_threshold {
            debug!("Closest earlier question has similarity {:.3}", similarity);
            return None;
        }

        let answer = turns.get(best + 1).filter(|t| t.role == TurnRole::Assistant)?;
        info!("Answer cache hit (similarity {:.3})", similarity);
        Some(&answer.content)
    }

    /// Recent context for the planner and finalizer: the rolling summary
    /// followed by the last unsummarized turns.
    pub fn context(&self) -> String {
        if !self.config.enabled {
            return String::new();
        }

        let recent: Vec<&ConversationTurn> = self
            .doc
            .turns
            .iter()
            .filter(|t| !t.summarized)
            .collect();
        let start = recent.len().saturating_sub(self.config.context_window_turns);

        let mut out = String::new();
        if !self.doc.summary.is_empty() {
            out.push_str("Summary of earlier conversation:\n");
            out.push_str(&self.doc.summary);
            out.push_str("\n\n");
        }
        for turn in &recent[start..] {
            out.push_str(&format!("{}: {}\n", turn.role, turn.content));
        }
        out.trim_end().to_string()
    }

    /// Append one answered question, then compact and enforce retention.
    pub async fn record(&mut self, query: &str, answer: &str, embedding: Option<Vec<f32>>) {
        if !self.config.enabled {
            return;
        }

        self.doc
            .turns
            .push(ConversationTurn::new(TurnRole::User, query, embedding));
        self.doc
            .turns
            .push(ConversationTurn::new(TurnRole::Assistant, answer, None));

        self.compact().await;
        self.enforce_retention().await;
    }

    /// Fold the oldest half of the unsummarized turns while they are over budget
    async fn compact(&mut self) {
        if !self.config.summarization_enabled {
            return;
        }

        loop {
            let window: Vec<usize> = self
                .doc
                .turns
                .iter()
                .enumerate()
                .filter(|(_, t)| !t.summarized)
                .map(|(i, _)| i)
                .collect();
            let tokens: usize = window
                .iter()
                .map(|&i| self.doc.turns[i].estimate_tokens())
                .sum();

            if tokens <= self.config.summary_threshold_tokens || window.len() < 2 {
                break;
            }

            let fold = &window[..(window.len() / 2).max(2)];
            debug!(
                "History at ~{} tokens, folding {} turn(s)",
                tokens,
                fold.len()
            );
            let folded: Vec<ConversationTurn> =
                fold.iter().map(|&i| self.doc.turns[i].clone()).collect();
            let digest = self.digest(&folded).await;
            self.append_summary(&digest);
            for &i in fold {
                self.doc.turns[i].summarized = true;
            }
        }
    }

    async fn enforce_retention(&mut self) {
        let max = self.config.max_retained_turns;
        if self.doc.turns.len() <= max {
            return;
        }

        let excess = self.doc.turns.len() - max;
        let dropped: Vec<ConversationTurn> = self
            .doc
            .turns
            .drain(..excess)
            .filter(|t| !t.summarized)
            .collect();
        debug!("Dropped {} turn(s) beyond retention", excess);

        if self.config.summarization_enabled && !dropped.is_empty() {
            let digest = self.digest(&dropped).await;
            self.append_summary(&digest);
        }
    }

    async fn digest(&self, turns: &[ConversationTurn]) -> String {
        let messages = [
            Message::system(&self.prompts.summarizer),
            Message::user(transcript(turns)),
        ];

        match self
            .llm
            .generate(&messages, &[], ChatOptions::default())
            .await
        {
            Ok(response) => {
                if let Some(text) = response.content.filter(|t| !t.trim().is_empty()) {
                    return text.trim().to_string();
                }
                warn!("Summarizer returned nothing, using an extractive digest");
            }
            Err(e) => warn!("Summarizer failed, using an extractive digest: {}", e),
        }
        extractive_digest(turns)
    }

    /// Append to the summary, keeping only the newest text within the cap
    fn append_summary(&mut self, digest: &str) {
        if !self.doc.summary.is_empty() {
            self.doc.summary.push('\n');
        }
        self.doc.summary.push_str(digest);

        let cap = self.config.summary_max_tokens * CHARS_PER_TOKEN;
        let total = self.doc.summary.chars().count();
        if total > cap {
            self.doc.summary = self.doc.summary.chars().skip(total - cap).collect();
        }
    }

    /// Rewrite the history file
    pub async fn persist(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let path = &self.config.history_path;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&self.doc).context("Failed to encode history")?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        debug!(
            "Saved {} turn(s) to {}",
            self.doc.turns.len(),
            path.display()
        );
        Ok(())
    }
}
