use super::KeywordRegistry;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;

/// Labels longer than this are truncated; the ellipsis counts towards the limit.
pub const LABEL_MAX_CHARS: usize = 40;

const ELLIPSIS: &str = "...";

const ARROW_GLYPHS: &[(char, &str)] = &[('→', "-->"), ('←', "<--"), ('⇒', "==>"), ('⇐', "<==")];

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?\s*```\s*$").expect("valid regex")
    })
}

/// `id[node label]` or `|edge label|`, matched in a single left-to-right scan.
fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9_]*)\[([^\[\]\n]*)\]|\|([^|\n]*)\|").expect("valid regex")
    })
}

fn paren_group_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([^()]*\)").expect("valid regex"))
}

fn whitespace_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("valid regex"))
}

/// Outcome of [`normalize_diagram_source`]. Both variants carry the rewritten text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramNormalization {
    Normalized(String),
    /// The rewritten text still does not start with a recognized diagram keyword.
    UnknownKeyword(String),
}

impl DiagramNormalization {
    pub fn text(&self) -> &str {
        match self {
            Self::Normalized(s) | Self::UnknownKeyword(s) => s,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Normalized(s) | Self::UnknownKeyword(s) => s,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Normalized(_))
    }
}

pub fn normalize_diagram_source(source: &str) -> DiagramNormalization {
    normalize_diagram_source_with(source, &KeywordRegistry::default())
}

/// Applies the fixed rewrite sequence; every step is idempotent, so the whole function is too.
pub fn normalize_diagram_source_with(
    source: &str,
    registry: &KeywordRegistry,
) -> DiagramNormalization {
    let text = unwrap_code_fence(source);
    let text = replace_arrow_glyphs(&text);
    let text = strip_label_parentheses(&text);
    let text = truncate_labels(&text, LABEL_MAX_CHARS).into_owned();
    let text = add_space_after_keyword(&text, registry);

    if registry.starts_with_keyword(&text) {
        DiagramNormalization::Normalized(text)
    } else {
        DiagramNormalization::UnknownKeyword(text)
    }
}

/// Removes a surrounding Markdown code fence and normalizes line endings.
pub fn unwrap_code_fence(source: &str) -> String {
    let text = source.replace("\r\n", "\n").replace('\r', "\n");
    let inner = match fence_regex().captures(&text) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).to_string(),
        None => text,
    };
    inner.trim().to_string()
}

pub fn replace_arrow_glyphs(source: &str) -> String {
    if !source.chars().any(|c| ARROW_GLYPHS.iter().any(|(g, _)| *g == c)) {
        return source.to_string();
    }
    let mut out = String::with_capacity(source.len() + 8);
    for ch in source.chars() {
        match ARROW_GLYPHS.iter().find(|(g, _)| *g == ch) {
            Some((_, ascii)) => out.push_str(ascii),
            None => out.push(ch),
        }
    }
    out
}

/// Splits `"text"` into its quotes and inner text.
fn split_quotes(label: &str) -> (&str, &str, &str) {
    if label.len() >= 2 && label.starts_with('"') && label.ends_with('"') {
        ("\"", &label[1..label.len() - 1], "\"")
    } else {
        ("", label, "")
    }
}

#[derive(Debug, Clone, Copy)]
enum Label<'a> {
    Node { id: &'a str, text: &'a str },
    Edge(&'a str),
}

/// Rewrites every node and edge label. A `|` inside `[...]` belongs to the node label and
/// never opens an edge label.
fn rewrite_labels<'a>(source: &'a str, rewrite: impl Fn(Label<'_>) -> String) -> Cow<'a, str> {
    label_regex().replace_all(source, |caps: &Captures| match caps.get(3) {
        Some(edge) => rewrite(Label::Edge(edge.as_str())),
        None => rewrite(Label::Node {
            id: caps.get(1).map_or("", |m| m.as_str()),
            text: caps.get(2).map_or("", |m| m.as_str()),
        }),
    })
}

/// Drops nested `( ... )` groups and collapses the whitespace they leave behind.
fn remove_paren_groups(text: &str) -> String {
    let mut stripped = text.to_string();
    loop {
        let next = paren_group_regex().replace_all(&stripped, "").into_owned();
        if next == stripped {
            break;
        }
        stripped = next;
    }
    whitespace_run_regex()
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

fn strip_node_parentheses(id: &str, label: &str) -> String {
    let unchanged = || format!("{id}[{label}]");
    if !label.contains('(') {
        return unchanged();
    }
    let trimmed = label.trim();
    // `[(text)]` is the cylinder shape, not a parenthesized aside.
    if trimmed.starts_with('(')
        && trimmed.ends_with(')')
        && trimmed[1..trimmed.len() - 1]
            .chars()
            .all(|c| c != '(' && c != ')')
    {
        return unchanged();
    }

    let (open, inner, close) = split_quotes(label);
    let stripped = remove_paren_groups(inner);
    if stripped.is_empty() {
        let generic = if id.is_empty() {
            "Node".to_string()
        } else {
            format!("Node {id}")
        };
        return format!("{id}[{open}{generic}{close}]");
    }
    format!("{id}[{open}{stripped}{close}]")
}

fn strip_edge_parentheses(label: &str) -> String {
    if !label.contains('(') {
        return format!("|{label}|");
    }
    let (open, inner, close) = split_quotes(label);
    let stripped = remove_paren_groups(inner);
    if stripped.is_empty() {
        // `A -->|(x)| B` becomes a plain `A --> B`.
        return String::new();
    }
    format!("|{open}{stripped}{close}|")
}

/// Removes `( ... )` groups inside `[...]` node labels and `|...|` edge labels. An emptied
/// node label becomes `Node <id>`; an emptied edge label is dropped.
pub fn strip_label_parentheses(source: &str) -> String {
    rewrite_labels(source, |label| match label {
        Label::Node { id, text } => strip_node_parentheses(id, text),
        Label::Edge(text) => strip_edge_parentheses(text),
    })
    .into_owned()
}

fn truncate_label(label: &str, limit: usize) -> Cow<'_, str> {
    let (open, inner, close) = split_quotes(label);
    if inner.chars().count() <= limit {
        return Cow::Borrowed(label);
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let prefix: String = inner.chars().take(keep).collect();
    Cow::Owned(format!("{open}{}{ELLIPSIS}{close}", prefix.trim_end()))
}

/// Truncates `[...]` node labels and `|...|` edge labels to `limit` characters.
pub fn truncate_labels(source: &str, limit: usize) -> Cow<'_, str> {
    let out = rewrite_labels(source, |label| match label {
        Label::Node { id, text } => format!("{id}[{}]", truncate_label(text, limit)),
        Label::Edge(text) => format!("|{}|", truncate_label(text, limit)),
    });
    if out == source {
        Cow::Borrowed(source)
    } else {
        out
    }
}

/// Removes double quotes inside `[...]` and `|...|` labels.
pub fn strip_label_quotes(source: &str) -> String {
    rewrite_labels(source, |label| match label {
        Label::Node { id, text } => format!("{id}[{}]", text.replace('"', "")),
        Label::Edge(text) => format!("|{}|", text.replace('"', "")),
    })
    .into_owned()
}

/// Separates a keyword glued to its direction (`graphTD` → `graph TD`).
pub fn add_space_after_keyword(source: &str, registry: &KeywordRegistry) -> String {
    let Some(m) = registry.match_keyword(source) else {
        return source.to_string();
    };
    if !m.glued_direction {
        return source.to_string();
    }
    let leading = source.len() - source.trim_start().len();
    let split_at = leading + m.keyword.len();
    format!("{} {}", &source[..split_at], &source[split_at..])
}
