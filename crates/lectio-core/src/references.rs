//! Canonicalizes bibliographic blocks into one `itens` array whose entries end with
//! [`REFERENCE_SENTINEL`].

use crate::sanitize::sanitize;
use crate::schema::{Block, BlockBody, REFERENCE_SENTINEL, ReferenceSource};
use regex::Regex;
use std::sync::OnceLock;

fn ordinal_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\d+\]").expect("valid regex"))
}

fn trailing_breaks_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:\s*<br\s*/?>)+\s*$").expect("valid regex"))
}

fn break_pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>\s*<br\s*/?>").expect("valid regex"))
}

/// Returns `block` with a canonical, sanitized reference payload. Other block kinds pass
/// through.
pub fn normalize_references(block: Block) -> Block {
    let Block {
        title,
        description,
        body,
    } = block;

    let body = match body {
        BlockBody::ReferenceList { source } => BlockBody::ReferenceList {
            source: ReferenceSource::Items(reference_items(&source)),
        },
        other => other,
    };

    Block {
        title,
        description,
        body,
    }
}

/// Canonical items for either payload shape: split, sanitized per item, sentinel-terminated.
pub fn reference_items(source: &ReferenceSource) -> Vec<String> {
    match source {
        ReferenceSource::Items(items) => items
            .iter()
            .filter_map(|item| canonical_item(item))
            .collect(),
        ReferenceSource::FreeText(text) => split_free_text(text)
            .iter()
            .filter_map(|item| canonical_item(item))
            .collect(),
    }
}

/// Splits at the start of every `[n]` marker. Text before the first marker is its own item.
pub fn split_free_text(text: &str) -> Vec<String> {
    let starts: Vec<usize> = ordinal_marker_regex()
        .find_iter(text)
        .map(|m| m.start())
        .collect();

    if starts.is_empty() {
        return break_pair_regex()
            .split(text)
            .map(str::to_string)
            .collect();
    }

    let mut items = Vec::with_capacity(starts.len() + 1);
    let head = &text[..starts[0]];
    if !head.trim().is_empty() {
        items.push(head.to_string());
    }
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        items.push(text[start..end].to_string());
    }
    items
}

/// Sanitizes one item on its own and ends it with the sentinel. Tags force-closed by the
/// sanitizer land before the sentinel, never after it.
pub fn canonical_item(item: &str) -> Option<String> {
    let body = trailing_breaks_regex().replace(item, "");
    normalize_item(&sanitize(body.trim()))
}

/// Trims an item and ends it with exactly one sentinel. Blank items yield `None`.
pub fn normalize_item(item: &str) -> Option<String> {
    let body = trailing_breaks_regex().replace(item, "");
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    Some(format!("{body}{REFERENCE_SENTINEL}"))
}
