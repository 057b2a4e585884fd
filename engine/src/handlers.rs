//! Command handlers for CLI operations
//!
//! Builds the engine from a validated configuration and answers one question.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::conductor::{Conductor, ConversationMemory, QueryReport, StepLimits};
use crate::config::Config;
use crate::llm::build_provider;
use crate::llm::embedding::build_embedder;
use crate::prompts::PromptLibrary;
use crate::retrieval::{
    ChromaClient, CodeRetriever, CollectionBackend, MultiCollectionStore, StoreOptions,
};
use crate::tools::{FilesystemTool, ToolContext, ToolRegistry};
use sdk::errors::EngineError;

/// Wire every component described by `config` into a conductor.
///
/// Nothing here touches the network; the first request happens when the
/// conductor health-checks the vector store.
pub async fn build_conductor(
    config: &Config,
    prompts: Arc<PromptLibrary>,
) -> Result<(Conductor, ChromaClient)> {
    let embedder = build_embedder(config)?;
    let llm = build_provider(&config.llm)?;

    let chroma = ChromaClient::new(
        config.vector_store.base_url(),
        Duration::from_secs(config.vector_store.request_timeout_secs),
    )?;
    let backends: Vec<Arc<dyn CollectionBackend>> = config
        .vector_store
        .collections
        .iter()
        .map(|name| Arc::new(chroma.collection(name)) as Arc<dyn CollectionBackend>)
        .collect();
    let retriever: Arc<dyn CodeRetriever> = Arc::new(MultiCollectionStore::new(
        backends,
        embedder.clone(),
        StoreOptions {
            top_k: config.retrieval.top_k,
            page_size: config.retrieval.scan_page_size,
        },
    ));

    let fs = match &config.core.source_root {
        Some(root) => {
            let tool = FilesystemTool::new(root.clone())
                .with_context(|| format!("Cannot use source root {}", root.display()))?;
            debug!("File-system tools enabled under {}", tool.root().display());
            Some(Arc::new(tool))
        }
        None => None,
    };
    let tools = Arc::new(ToolRegistry::new(ToolContext {
        retriever: retriever.clone(),
        fs,
    }));
    info!("Tools available: {}", tools.names().join(", "));

    let memory = ConversationMemory::load(
        config.memory.clone(),
        embedder,
        llm.clone(),
        prompts.clone(),
    )
    .await
    .context("Failed to load conversation history")?;

    let conductor = Conductor::new(
        llm,
        tools,
        retriever,
        prompts,
        memory,
        config.llm.effective_tool_format(),
        StepLimits {
            max_turns: config.retrieval.max_turns,
            max_tool_output_chars: config.retrieval.max_tool_output_chars,
        },
    );

    Ok((conductor, chroma))
}

/// Answer one question
pub async fn handle_ask(config: &Config, question: &str) -> Result<QueryReport> {
    let prompts = Arc::new(PromptLibrary::load(&config.prompts)?);
    let (mut conductor, chroma) = build_conductor(config, prompts).await?;

    match conductor.ask(question).await {
        Ok(report) => {
            if report.from_cache {
                info!("Answered from conversation history");
            } else {
                info!("Answered after {} step(s)", report.outcomes.len());
            }
            Ok(report)
        }
        Err(e) if is_store_unavailable(&e) => {
            // Point at the likely cause: a misspelled collection name
            let hint = match chroma.list_collections().await {
                Ok(names) if names.is_empty() => "the server has no collections".to_string(),
                Ok(names) => format!("the server has: {}", names.join(", ")),
                Err(_) => format!("no server answered at {}", config.vector_store.base_url()),
            };
            Err(e.context(format!(
                "Configured collections: {} ({})",
                config.vector_store.collections.join(", "),
                hint
            )))
        }
        Err(e) => Err(e),
    }
}

fn is_store_unavailable(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<EngineError>(),
        Some(EngineError::VectorStoreUnavailable(_))
    )
}
