//! API key handling
//!
//! Keys live in `SecretString` so they never reach a log line, and provider
//! error bodies pass through `scrub_secrets` before they are wrapped into an
//! `EngineError`.

pub mod string;

pub use string::SecretString;

use regex::Regex;
use std::sync::OnceLock;

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns for the credential formats the configured providers use:
/// - OpenAI keys: sk-..., sk-proj-...
/// - Anthropic keys: sk-ant-...
/// - Bearer tokens
fn secret_patterns() -> &'static [Regex] {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"sk-ant-[a-zA-Z0-9\-_]{20,}",
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"Bearer\s+[^\s]{20,}",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Replace anything that looks like a credential with `[REDACTED]`.
pub fn scrub_secrets(text: &str) -> String {
    let mut scrubbed = text.to_string();
    for pattern in secret_patterns() {
        scrubbed = pattern.replace_all(&scrubbed, "[REDACTED]").into_owned();
    }
    scrubbed
}
