use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use sdk::errors::EngineError;
use sonar_engine::fs_guard::FileSystemGuard;
use sonar_engine::llm::embedding::Embedder;
use sonar_engine::retrieval::{CollectionBackend, InMemoryCollection, MultiCollectionStore, StoreOptions};
use sonar_engine::secrets::scrub_secrets;
use sonar_engine::tools::{FilesystemTool, ToolContext, ToolRegistry};

struct ZeroEmbedder;

#[async_trait]
impl Embedder for ZeroEmbedder {
    fn model(&self) -> &str {
        "zero"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EngineError> {
        Ok(vec![0.0])
    }
}

fn workspace() -> (TempDir, std::path::PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
    std::fs::write(root.join(".env"), "OPENAI_API_KEY=sk-secret").unwrap();
    std::fs::write(temp.path().join("outside.txt"), "outside").unwrap();
    (temp, root)
}

fn registry(root: &Path) -> ToolRegistry {
    let code: Arc<dyn CollectionBackend> = Arc::new(InMemoryCollection::new("code"));
    let store = MultiCollectionStore::new(
        vec![code],
        Arc::new(ZeroEmbedder),
        StoreOptions::default(),
    );
    ToolRegistry::new(ToolContext {
        retriever: Arc::new(store),
        fs: Some(Arc::new(FilesystemTool::new(root.to_path_buf()).unwrap())),
    })
}

#[test]
fn test_path_traversal_prevention() {
    let (_temp, root) = workspace();
    let guard = FileSystemGuard::new(root.clone()).unwrap();

    // Relative and absolute paths inside the root
    assert!(guard.validate_path(Path::new("src/main.rs")).is_ok());
    assert!(guard.validate_path(&root.join("src/main.rs")).is_ok());

    assert!(matches!(
        guard.validate_path(Path::new("../outside.txt")),
        Err(EngineError::PathOutsideRoot(_))
    ));
    assert!(matches!(
        guard.validate_path(Path::new(".env")),
        Err(EngineError::PathDenied(_))
    ));
    assert!(guard.validate_path(Path::new("src/missing.rs")).is_err());
}

#[cfg(unix)]
#[test]
fn test_symlink_escape_is_rejected() {
    let (temp, root) = workspace();
    std::os::unix::fs::symlink(temp.path().join("outside.txt"), root.join("link.txt")).unwrap();

    let guard = FileSystemGuard::new(root).unwrap();
    assert!(matches!(
        guard.validate_path(Path::new("link.txt")),
        Err(EngineError::PathOutsideRoot(_))
    ));
}

#[tokio::test]
async fn test_file_tools_never_leak_outside_the_root() {
    let (_temp, root) = workspace();
    let tools = registry(&root);

    let inside: Value =
        serde_json::from_str(&tools.dispatch("read_file", r#"{"path": "src/main.rs"}"#).await)
            .unwrap();
    assert_eq!(inside["text"], "fn main() {}");

    for args in [
        r#"{"path": "../outside.txt"}"#,
        r#"{"path": ".env"}"#,
        r#"{"path": "/etc/passwd"}"#,
    ] {
        let payload = tools.dispatch("read_file", args).await;
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert!(value.get("error").is_some(), "{} was not rejected", args);
        assert!(!payload.contains("outside\""));
        assert!(!payload.contains("sk-secret"));
    }

    let listing = tools.dispatch("list_dir", r#"{"path": ".."}"#).await;
    assert!(serde_json::from_str::<Value>(&listing).unwrap().get("error").is_some());
}

#[test]
fn test_scrub_provider_credentials() {
    let cases = [
        (
            "Error: Authentication failed with key sk-proj-1234567890abcdefghijklmnopqrstuvwxyz",
            "Error: Authentication failed with key [REDACTED]",
        ),
        (
            "invalid x-api-key sk-ant-REDACTED",
            "invalid x-api-key [REDACTED]",
        ),
        (
            "Authorization header: Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJzdWIiOiIxMjM0NTY3ODkwIn0",
            "Authorization header: [REDACTED]",
        ),
    ];

    for (input, expected) in cases {
        assert_eq!(scrub_secrets(input), expected, "Failed to scrub: {}", input);
    }
}

#[test]
fn test_scrub_preserves_non_secrets() {
    let text = r#"
    Configuration loaded successfully.
    Collections: codebase, docs
    Log level: INFO
    LLM providers: ollama, openai, anthropic
    "#;

    assert_eq!(scrub_secrets(text), text);
}
