#![forbid(unsafe_code)]

//! Lesson document model and repair pipeline (headless).
//!
//! Design goals:
//! - accept whatever shape a content generator produced and never drop a block
//! - deterministic, idempotent normalizers (a second pass is a no-op)
//! - runtime-agnostic async APIs (no specific executor required)

pub mod balance;
pub mod config;
pub mod diagram;
pub mod error;
pub mod references;
pub mod repair;
pub mod sanitize;
pub mod schema;

pub use balance::{BalanceReport, BalanceWarning};
pub use config::LectioConfig;
pub use diagram::{DiagramNormalization, KeywordRegistry, normalize_diagram_source};
pub use error::{Error, Result};
pub use references::normalize_references;
pub use repair::{
    AssistError, BlockWarning, NoAssistant, RepairAssistant, RepairDiagnostics, RepairMode,
    RepairOutcome, RepairRequest, Repairer, repair_deterministic,
};
pub use sanitize::sanitize;
pub use schema::{
    Block, BlockBody, ChartKind, ChartPoint, DiagramKind, Document, ExpandableSection,
    REFERENCE_SENTINEL, ReferenceSource,
};

#[cfg(test)]
mod tests;
