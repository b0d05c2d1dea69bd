//! Document repair: an optional assisted rewrite followed by the deterministic normalizers.
//!
//! The assisted pass is a best-effort optimizer. Whatever it returns is treated as untrusted
//! input and goes through the same sanitize/normalize pass as the original document, so the
//! result never depends on the assistant behaving.

use crate::balance::{self, BalanceReport, BalanceWarning};
use crate::diagram::{KeywordRegistry, normalize_diagram_source_with, unwrap_code_fence};
use crate::references::normalize_references;
use crate::sanitize::sanitize;
use crate::schema::{Block, BlockBody, Document, expandable_sections, is_expandable_component};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Value, json};
use std::panic::AssertUnwindSafe;

/// Rules sent along with the document to the rewrite assistant.
pub const REPAIR_INSTRUCTIONS: &str = "\
You repair a lesson document given as JSON. Return only the corrected JSON document with the \
same blocks in the same order; never add, remove or reorder blocks.
Rules:
1. Free-text fields may only use the tags strong, em, br, u, span, p and code. Remove every \
other tag but keep its text. Close every tag you open.
2. In diagram sources replace the arrow characters → ← ⇒ ⇐ with --> <-- ==> <==.
3. Remove parenthesized text inside node labels in square brackets, e.g. A[Pressure (P/y)] \
becomes A[Pressure].
4. Keep every diagram label at most 40 characters; shorten longer ones and end them with '...'.
5. Every diagram source must start with its diagram keyword (graph, flowchart, mindmap, ...).
6. Reference lists use an \"itens\" array with one citation per entry, each ending with \
<br><br>. Split a single \"texto\" field at every [n] marker.";

#[derive(Debug, Clone, Serialize)]
pub struct RepairRequest {
    pub instructions: &'static str,
    pub document: Value,
}

impl RepairRequest {
    pub fn new(document: &Document) -> Self {
        Self {
            instructions: REPAIR_INSTRUCTIONS,
            document: document.to_value(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    #[error("assist transport failed: {message}")]
    Transport { message: String },
    #[error("assist response rejected: {message}")]
    Rejected { message: String },
}

/// The rewrite collaborator. One call per document.
pub trait RepairAssistant {
    /// Returns the raw response text; it is parsed and validated by the caller.
    fn rewrite<'a>(
        &'a self,
        request: &'a RepairRequest,
    ) -> BoxFuture<'a, std::result::Result<String, AssistError>>;
}

/// Assistant used when no rewrite service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssistant;

impl RepairAssistant for NoAssistant {
    fn rewrite<'a>(
        &'a self,
        _request: &'a RepairRequest,
    ) -> BoxFuture<'a, std::result::Result<String, AssistError>> {
        async {
            Err::<String, _>(AssistError::Transport {
                message: "no assistant configured".to_string(),
            })
        }
        .boxed()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum RepairMode {
    Assisted,
    DeterministicOnly { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BlockWarning {
    DiagramKeywordMissing { block: usize },
    UnknownKind { block: usize, kind: String },
    UnsupportedComponent { block: usize, name: String },
}

impl std::fmt::Display for BlockWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DiagramKeywordMissing { block } => {
                write!(f, "block {block}: diagram source has no recognized keyword")
            }
            Self::UnknownKind { block, kind } => write!(f, "block {block}: unknown kind `{kind}`"),
            Self::UnsupportedComponent { block, name } => {
                write!(f, "block {block}: unsupported component `{name}`")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairDiagnostics {
    pub mode: RepairMode,
    pub balance: BalanceReport,
    pub balance_warnings: Vec<BalanceWarning>,
    pub block_warnings: Vec<BlockWarning>,
}

impl RepairDiagnostics {
    pub fn warning_count(&self) -> usize {
        self.balance_warnings.len() + self.block_warnings.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairOutcome {
    pub document: Document,
    pub diagnostics: RepairDiagnostics,
}

#[derive(Debug, Clone)]
pub struct Repairer<A> {
    assistant: A,
    registry: KeywordRegistry,
}

impl Default for Repairer<NoAssistant> {
    fn default() -> Self {
        Self::new(NoAssistant)
    }
}

impl<A: RepairAssistant> Repairer<A> {
    pub fn new(assistant: A) -> Self {
        Self {
            assistant,
            registry: KeywordRegistry::default(),
        }
    }

    pub fn with_registry(mut self, registry: KeywordRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn assistant(&self) -> &A {
        &self.assistant
    }

    /// Repairs `document`. Never fails: assist faults fall back to the deterministic pass over
    /// the original document.
    pub async fn repair(&self, document: Document) -> RepairOutcome {
        let request = RepairRequest::new(&document);
        let response = AssertUnwindSafe(self.assistant.rewrite(&request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(AssistError::Transport {
                    message: "assistant panicked".to_string(),
                })
            });

        let (candidate, mode) = match response.and_then(|raw| parse_assist_response(&raw, &document)) {
            Ok(candidate) => (candidate, RepairMode::Assisted),
            Err(err) => {
                tracing::warn!(%err, "assisted repair unavailable; using deterministic normalizers only");
                (
                    document,
                    RepairMode::DeterministicOnly {
                        reason: err.to_string(),
                    },
                )
            }
        };

        finish(candidate, mode, &self.registry)
    }

    /// Deterministic pass only (no assistant call).
    pub fn repair_deterministic(&self, document: Document) -> RepairOutcome {
        finish(
            document,
            RepairMode::DeterministicOnly {
                reason: "assist skipped".to_string(),
            },
            &self.registry,
        )
    }
}

/// Deterministic repair with the default keyword registry.
pub fn repair_deterministic(document: Document) -> RepairOutcome {
    Repairer::default().repair_deterministic(document)
}

fn finish(document: Document, mode: RepairMode, registry: &KeywordRegistry) -> RepairOutcome {
    let mut block_warnings = Vec::new();
    let Document {
        general_title,
        blocks,
    } = document;

    let blocks: Vec<Block> = blocks
        .into_iter()
        .enumerate()
        .map(|(index, block)| {
            let fallback = block.clone();
            let mut local = Vec::new();
            match std::panic::catch_unwind(AssertUnwindSafe(|| {
                repair_block(block, index, registry, &mut local)
            })) {
                Ok(repaired) => {
                    block_warnings.append(&mut local);
                    repaired
                }
                Err(_) => {
                    tracing::error!(block = index, "block repair panicked; keeping it as received");
                    fallback
                }
            }
        })
        .collect();

    let balance = balance::measure(&blocks);
    let balance_warnings = balance.warnings();

    for w in &balance_warnings {
        tracing::warn!(warning = %w, "lesson structure");
    }
    for w in &block_warnings {
        tracing::warn!(warning = %w, "lesson block");
    }

    RepairOutcome {
        document: Document {
            general_title: sanitize(&general_title),
            blocks,
        },
        diagnostics: RepairDiagnostics {
            mode,
            balance,
            balance_warnings,
            block_warnings,
        },
    }
}

/// Sanitizes and normalizes one block. Idempotent.
pub fn repair_block(
    block: Block,
    index: usize,
    registry: &KeywordRegistry,
    warnings: &mut Vec<BlockWarning>,
) -> Block {
    let Block {
        title,
        description,
        body,
    } = block;

    let body = match body {
        BlockBody::Heading { level, text } => BlockBody::Heading {
            level: level.clamp(2, 4),
            text: sanitize(&text),
        },
        BlockBody::Paragraph { text } => BlockBody::Paragraph {
            text: sanitize(&text),
        },
        BlockBody::HighlightBox { text } => BlockBody::HighlightBox {
            text: sanitize(&text),
        },
        BlockBody::Sticky { text } => BlockBody::Sticky {
            text: sanitize(&text),
        },
        BlockBody::Diagram {
            diagram_kind,
            graph_source,
        } => {
            let normalized = normalize_diagram_source_with(&graph_source, registry);
            if !normalized.is_recognized() {
                warnings.push(BlockWarning::DiagramKeywordMissing { block: index });
            }
            BlockBody::Diagram {
                diagram_kind,
                graph_source: normalized.into_text(),
            }
        }
        BlockBody::Chart { chart_kind, series } => BlockBody::Chart { chart_kind, series },
        BlockBody::Composite {
            component_name,
            props,
        } => {
            if is_expandable_component(&component_name) {
                let items: Vec<Value> = expandable_sections(&props)
                    .into_iter()
                    .map(|s| json!({ "trigger": sanitize(&s.trigger), "content": sanitize(&s.content) }))
                    .collect();
                BlockBody::Composite {
                    component_name,
                    props: json!({ "items": items }),
                }
            } else {
                warnings.push(BlockWarning::UnsupportedComponent {
                    block: index,
                    name: component_name.clone(),
                });
                BlockBody::Composite {
                    component_name,
                    props,
                }
            }
        }
        BlockBody::GuidelineList { items } => BlockBody::GuidelineList {
            items: items
                .iter()
                .map(|item| sanitize(item))
                .filter(|item| !item.trim().is_empty())
                .collect(),
        },
        // Split first: an `[n]` marker inside inline markup must not leave unbalanced items.
        BlockBody::ReferenceList { source } => {
            normalize_references(Block::new(BlockBody::ReferenceList { source })).body
        }
        BlockBody::Unknown { original_kind } => {
            warnings.push(BlockWarning::UnknownKind {
                block: index,
                kind: original_kind.clone(),
            });
            BlockBody::Unknown { original_kind }
        }
    };

    Block {
        title: title.map(|t| sanitize(&t)),
        description: description.map(|d| sanitize(&d)),
        body,
    }
}

/// Parses an assistant response as a document and checks it kept every block.
pub fn parse_assist_response(
    raw: &str,
    original: &Document,
) -> std::result::Result<Document, AssistError> {
    let text = unwrap_code_fence(raw);
    let value: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(json_err) => json5::from_str(&text).map_err(|json5_err| AssistError::Rejected {
            message: format!("response is not JSON ({json_err}) nor JSON5 ({json5_err})"),
        })?,
    };

    let value = match value {
        Value::Object(mut obj) if obj.contains_key("document") && !obj.contains_key("blocks") => {
            obj.remove("document").unwrap_or(Value::Null)
        }
        other => other,
    };

    let mut candidate = Document::from_value(&value).map_err(|err| AssistError::Rejected {
        message: err.to_string(),
    })?;

    if candidate.blocks.len() != original.blocks.len() {
        return Err(AssistError::Rejected {
            message: format!(
                "assistant returned {} block(s) for {}",
                candidate.blocks.len(),
                original.blocks.len()
            ),
        });
    }
    if candidate.general_title.trim().is_empty() {
        candidate.general_title = original.general_title.clone();
    }
    Ok(candidate)
}
