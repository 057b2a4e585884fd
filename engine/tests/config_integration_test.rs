//! Integration tests for configuration management
//!
//! These tests load configuration files from disk and check that paths are
//! expanded and canonicalized, prompt overrides resolve, and every invalid
//! field is reported at once.

use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

use sdk::errors::EngineError;
use sonar_engine::config::{Config, ToolFormat};
use sonar_engine::prompts::PromptLibrary;

const MINIMAL: &str = r#"
[llm]
provider = "ollama"

[vector_store]
collections = ["codebase", "docs"]
"#;

fn field_names(err: EngineError) -> Vec<String> {
    match err {
        EngineError::InvalidConfig(errors) => errors.into_iter().map(|e| e.field).collect(),
        other => panic!("Expected InvalidConfig, got: {:?}", other),
    }
}

#[test]
fn test_load_from_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, MINIMAL).unwrap();

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.llm.provider, "ollama");
    assert_eq!(config.llm.effective_tool_format(), ToolFormat::OpenAI);
    assert_eq!(config.vector_store.collections, vec!["codebase", "docs"]);
    assert_eq!(config.vector_store.base_url(), "http://localhost:8000");
    assert_eq!(config.retrieval.top_k, 10);
    assert!(config.memory.enabled);
}

#[test]
fn test_missing_file_is_a_config_error() {
    let temp = TempDir::new().unwrap();
    let err = Config::load_from_path(&temp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn test_malformed_toml_is_a_config_error() {
    let err = Config::from_toml_str("[llm\nprovider = ").unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn test_missing_required_section_rejected() {
    let err = Config::from_toml_str("[llm]\nprovider = \"ollama\"\n").unwrap_err();
    match err {
        EngineError::Config(msg) => assert!(msg.contains("vector_store")),
        other => panic!("Expected Config, got: {:?}", other),
    }
}

#[test]
fn test_source_root_is_canonicalized() {
    let temp = TempDir::new().unwrap();
    let nested = temp.path().join("repo");
    fs::create_dir(&nested).unwrap();

    let toml = format!(
        "{}\n[core]\nsource_root = \"{}\"\n",
        MINIMAL,
        nested.join("..").join("repo").display()
    );
    let config = Config::from_toml_str(&toml).unwrap();

    assert_eq!(
        config.core.source_root.unwrap(),
        nested.canonicalize().unwrap()
    );
}

#[test]
fn test_source_root_must_be_a_directory() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("not_a_dir.txt");
    fs::write(&file, "x").unwrap();

    let toml = format!("{}\n[core]\nsource_root = \"{}\"\n", MINIMAL, file.display());
    let fields = field_names(Config::from_toml_str(&toml).unwrap_err());
    assert_eq!(fields, vec!["core.source_root"]);
}

#[test]
fn test_prompt_override_is_loaded() {
    let temp = TempDir::new().unwrap();
    let planner = temp.path().join("planner.md");
    fs::write(&planner, "  Plan in at most three steps.\n").unwrap();

    let toml = format!("{}\n[prompts]\nplanner = \"{}\"\n", MINIMAL, planner.display());
    let config = Config::from_toml_str(&toml).unwrap();
    let prompts = PromptLibrary::load(&config.prompts).unwrap();

    assert_eq!(prompts.planner, "Plan in at most three steps.");
    assert_eq!(prompts.finalizer, PromptLibrary::default().finalizer);
}

#[test]
fn test_every_invalid_field_is_reported() {
    let toml = r#"
[core]
log_level = "loud"

[llm]
provider = "ollama"

[llm.ollama]
base_url = "localhost:11434"

[vector_store]
port = 0
collections = []

[retrieval]
top_k = 0
max_turns = 51

[memory]
cache_similarity_threshold = 1.5
"#;
    let fields = field_names(Config::from_toml_str(toml).unwrap_err());

    for expected in [
        "core.log_level",
        "llm.ollama.base_url",
        "vector_store.port",
        "vector_store.collections",
        "retrieval.top_k",
        "retrieval.max_turns",
        "memory.cache_similarity_threshold",
    ] {
        assert!(fields.iter().any(|f| f == expected), "missing {}", expected);
    }
}

#[test]
fn test_serialized_config_loads_back() {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default_config();
    config.vector_store.collections = vec!["a".into(), "b".into()];
    config.retrieval.top_k = 25;
    config.memory.history_path = temp.path().join("history.json");

    let path = temp.path().join("config.toml");
    fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
    let loaded = Config::load_from_path(&path).unwrap();

    assert_eq!(loaded.vector_store.collections, vec!["a", "b"]);
    assert_eq!(loaded.retrieval.top_k, 25);
    assert_eq!(loaded.memory.history_path, temp.path().join("history.json"));
}

proptest! {
    // top_k is accepted exactly on 1..=100
    #[test]
    fn test_top_k_range(top_k in 0usize..200) {
        let toml = format!("{}\n[retrieval]\ntop_k = {}\n", MINIMAL, top_k);
        let result = Config::from_toml_str(&toml);

        if (1..=100).contains(&top_k) {
            prop_assert!(result.is_ok());
        } else {
            prop_assert_eq!(field_names(result.unwrap_err()), vec!["retrieval.top_k".to_string()]);
        }
    }

    #[test]
    fn test_log_level_validation(level in "[a-z]{3,6}") {
        let toml = format!("{}\n[core]\nlog_level = \"{}\"\n", MINIMAL, level);
        let valid = ["error", "warn", "info", "debug", "trace"].contains(&level.as_str());
        prop_assert_eq!(Config::from_toml_str(&toml).is_ok(), valid);
    }
}
