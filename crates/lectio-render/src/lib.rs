#![forbid(unsafe_code)]

//! Presentation layer for repaired lesson documents.
//!
//! Rendering is total: every block maps to a [`model::Node`], diagram blocks are resolved by
//! the [`retry`] engine, and faults are contained per subtree by [`isolate`].
//!
//! Diagram resolution uses `tokio::time` for its bounded waits and must be polled inside a
//! Tokio runtime with the time driver enabled. Everything else is executor-agnostic.

pub mod block;
pub mod document;
pub mod html;
pub mod isolate;
pub mod model;
pub mod outline;
pub mod retry;

pub use block::{BlockRenderer, StandardRenderer, StickyCategory, classify_sticky};
pub use document::DocumentRenderer;
pub use model::{DiagramView, Node};
pub use outline::OutlineEngine;
pub use retry::{AttemptResult, DiagramEngine, RetryEngine, RetryState, Strategy, transition};

use lectio_core::LectioConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("diagram syntax error: {message}")]
    Syntax { message: String },
    #[error("unsupported diagram type: {keyword}")]
    Unsupported { keyword: String },
    #[error("diagram engine timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
}

impl EngineError {
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("render failed: {message}")]
    Render { message: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Prefix of the ids handed to the diagram engine; sanitized with [`sanitize_id`].
    pub id_prefix: String,
    pub attempt_timeout: Duration,
    pub excerpt_chars: usize,
    pub retry_label_limit: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_config(&LectioConfig::defaults())
    }
}

impl RenderOptions {
    pub fn from_config(config: &LectioConfig) -> Self {
        Self {
            id_prefix: sanitize_id(config.id_prefix()),
            attempt_timeout: config.attempt_timeout(),
            excerpt_chars: config.excerpt_chars(),
            retry_label_limit: config.retry_label_limit(),
        }
    }
}

/// Converts an arbitrary string into a conservative element id token, so several rendered
/// documents can share one page without id collisions.
///
/// Unsupported characters become `-`, runs of `-` collapse, and the id is prefixed with `l-`
/// unless it starts with an ASCII letter.
pub fn sanitize_id(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "lectio".to_string();
    }

    let mut out = String::with_capacity(raw.len() + 2);
    for ch in raw.chars() {
        let ok = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_';
        out.push(if ok { ch } else { '-' });
    }
    if !out.starts_with(|c: char| c.is_ascii_alphabetic()) {
        out.insert_str(0, "l-");
    }
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    let out = out.trim_matches('-');
    if out.is_empty() || out == "l" {
        return "lectio".to_string();
    }
    out.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_made_safe_for_embedding() {
        assert_eq!(sanitize_id("lectio"), "lectio");
        assert_eq!(sanitize_id("  my lesson #1 "), "my-lesson-1");
        assert_eq!(sanitize_id("42 answers"), "l-42-answers");
        assert_eq!(sanitize_id("***"), "lectio");
        assert_eq!(sanitize_id(""), "lectio");
    }

    #[test]
    fn options_follow_configuration() {
        let config = LectioConfig::with_overrides(&json!({
            "diagram": { "attemptTimeoutMs": 250, "excerptChars": 16 },
            "render": { "idPrefix": "aula 3" }
        }));
        let options = RenderOptions::from_config(&config);
        assert_eq!(options.attempt_timeout, Duration::from_millis(250));
        assert_eq!(options.excerpt_chars, 16);
        assert_eq!(options.retry_label_limit, 24);
        assert_eq!(options.id_prefix, "aula-3");
    }
}
