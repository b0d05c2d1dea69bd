//! Built-in strict diagram engine for flowcharts and mindmaps.
//!
//! It accepts a deliberately small grammar and emits a plain layered SVG outline. Anything
//! outside the grammar is a syntax error, so the retry strategies have something to fix.

use crate::EngineError;
use crate::retry::DiagramEngine;
use futures::FutureExt;
use futures::future::BoxFuture;
use lectio_core::KeywordRegistry;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;
use unicode_width::UnicodeWidthStr;

const DIRECTIONS: &[&str] = &["TD", "TB", "BT", "RL", "LR"];
const IGNORED_STATEMENTS: &[&str] = &[
    "subgraph", "end", "classDef", "class", "style", "linkStyle", "click", "direction",
];

const CHAR_WIDTH: f64 = 8.0;
const PADDING: f64 = 12.0;
const NODE_HEIGHT: f64 = 36.0;
const GAP_X: f64 = 32.0;
const GAP_Y: f64 = 48.0;
const MINDMAP_ROW: f64 = 28.0;
const MINDMAP_INDENT: f64 = 24.0;

fn arrow_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^<?(?:-\.+->|-\.+-|-{2,}>|-{3,}|={2,}>|={3,}|--[ox])").expect("valid regex")
    })
}

fn syntax(message: impl Into<String>) -> EngineError {
    EngineError::syntax(message)
}

fn fmt(v: f64) -> String {
    let s = format!("{v:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn esc(text: &str) -> String {
    htmlize::escape_text(text).into_owned()
}

fn esc_attr(text: &str) -> String {
    htmlize::escape_attribute(text).into_owned()
}

#[derive(Debug, Clone)]
pub struct OutlineEngine {
    max_label_width: usize,
    registry: KeywordRegistry,
}

impl Default for OutlineEngine {
    fn default() -> Self {
        Self::new(lectio_core::diagram::LABEL_MAX_CHARS)
    }
}

impl OutlineEngine {
    /// Labels wider than `max_label_width` display columns are rejected.
    pub fn new(max_label_width: usize) -> Self {
        Self {
            max_label_width,
            registry: KeywordRegistry::default(),
        }
    }

    pub fn max_label_width(&self) -> usize {
        self.max_label_width
    }

    pub fn render_source(&self, id: &str, source: &str) -> Result<String, EngineError> {
        let mut lines = source
            .lines()
            .map(strip_comment)
            .filter(|l| !l.trim().is_empty());
        let Some(first) = lines.next() else {
            return Err(syntax("empty diagram"));
        };

        let (header, inline_rest) = match first.split_once(';') {
            Some((h, rest)) => (h, Some(rest)),
            None => (first, None),
        };
        let mut tokens = header.split_whitespace();
        let keyword = tokens.next().unwrap_or_default();

        match keyword {
            "graph" | "flowchart" => {
                let direction = match tokens.next() {
                    None => "TD",
                    Some(d) if DIRECTIONS.contains(&d) => d,
                    Some(other) => return Err(syntax(format!("unknown direction `{other}`"))),
                };
                if let Some(extra) = tokens.next() {
                    return Err(syntax(format!("unexpected `{extra}` after direction")));
                }
                let body = inline_rest.into_iter().chain(lines);
                let graph = self.parse_flow(body)?;
                Ok(render_flow_svg(id, direction, &graph))
            }
            "mindmap" => {
                if inline_rest.is_some() || tokens.next().is_some() {
                    return Err(syntax("unexpected text after `mindmap`"));
                }
                let tree = self.parse_mindmap(lines)?;
                Ok(render_mindmap_svg(id, &tree))
            }
            _ => match self.registry.match_keyword(header) {
                Some(m) if !m.glued_direction => Err(EngineError::Unsupported {
                    keyword: m.keyword.to_string(),
                }),
                Some(m) => Err(syntax(format!("expected whitespace after `{}`", m.keyword))),
                None => Err(syntax("missing diagram keyword")),
            },
        }
    }

    fn parse_flow<'a>(&self, lines: impl Iterator<Item = &'a str>) -> Result<FlowGraph, EngineError> {
        let mut graph = FlowGraph::default();
        for line in lines {
            for statement in line.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                let head = statement.split_whitespace().next().unwrap_or_default();
                if IGNORED_STATEMENTS.contains(&head) {
                    continue;
                }
                self.parse_statement(statement, &mut graph)?;
            }
        }
        if graph.nodes.is_empty() {
            return Err(syntax("flowchart has no nodes"));
        }
        Ok(graph)
    }

    fn parse_statement(&self, statement: &str, graph: &mut FlowGraph) -> Result<(), EngineError> {
        let mut c = Cursor::new(statement);
        let mut prev = self.parse_node(&mut c, graph)?;
        loop {
            c.skip_ws();
            let Some(ch) = c.peek() else {
                return Ok(());
            };
            let Some(m) = arrow_regex().find(c.rest()) else {
                return Err(syntax(format!("unexpected `{ch}`")));
            };
            c.pos += m.end();
            c.skip_ws();
            let label = if c.eat("|") {
                let inner = c
                    .take_until("|")
                    .ok_or_else(|| syntax("unterminated edge label"))?;
                Some(self.validate_label(inner)?)
            } else {
                None
            };
            let next = self.parse_node(&mut c, graph)?;
            graph.edges.push(FlowEdge {
                from: prev,
                to: next,
                label,
            });
            prev = next;
        }
    }

    fn parse_node(&self, c: &mut Cursor<'_>, graph: &mut FlowGraph) -> Result<usize, EngineError> {
        c.skip_ws();
        let rest = c.rest();
        let len = rest
            .char_indices()
            .find(|(_, ch)| !(ch.is_alphanumeric() || *ch == '_'))
            .map_or(rest.len(), |(i, _)| i);
        if len == 0 {
            return Err(match c.peek() {
                Some(ch) => syntax(format!("expected a node id, found `{ch}`")),
                None => syntax("expected a node id"),
            });
        }
        let id = &rest[..len];
        c.pos += len;
        let label = self.parse_shape(c)?;
        Ok(graph.upsert(id, label))
    }

    fn parse_shape(&self, c: &mut Cursor<'_>) -> Result<Option<String>, EngineError> {
        const SHAPES: &[(&str, &str)] = &[
            ("[(", ")]"),
            ("((", "))"),
            ("{{", "}}"),
            ("[", "]"),
            ("(", ")"),
            ("{", "}"),
            (">", "]"),
        ];
        for (open, close) in SHAPES {
            if c.eat(open) {
                let inner = c
                    .take_until(close)
                    .ok_or_else(|| syntax(format!("unterminated `{open}` label")))?;
                return self.validate_label(inner).map(Some);
            }
        }
        Ok(None)
    }

    fn validate_label(&self, raw: &str) -> Result<String, EngineError> {
        let trimmed = raw.trim();
        let text = if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            let inner = &trimmed[1..trimmed.len() - 1];
            if inner.contains('"') {
                return Err(syntax("unbalanced quote in label"));
            }
            inner
        } else {
            if trimmed.contains('"') {
                return Err(syntax("quote inside unquoted label"));
            }
            if trimmed.contains(['(', ')', '[', ']', '{', '}']) {
                return Err(syntax(format!("bracket inside label `{trimmed}`")));
            }
            trimmed
        };
        if text.width() > self.max_label_width {
            return Err(syntax(format!(
                "label wider than {} columns",
                self.max_label_width
            )));
        }
        Ok(text.to_string())
    }

    fn parse_mindmap<'a>(
        &self,
        lines: impl Iterator<Item = &'a str>,
    ) -> Result<Vec<MindmapNode>, EngineError> {
        let mut nodes: Vec<MindmapNode> = Vec::new();
        // (indent, node index) of the current ancestry.
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for line in lines {
            let trimmed = line.trim();
            if trimmed.starts_with("::icon") || trimmed.starts_with(":::") {
                continue;
            }
            let indent = line.len() - line.trim_start().len();
            while stack.last().is_some_and(|(i, _)| *i >= indent) {
                stack.pop();
            }
            let depth = stack.len();
            if depth == 0 && !nodes.is_empty() {
                return Err(syntax("mindmap has more than one root"));
            }
            let label = mindmap_label(trimmed);
            if label.width() > self.max_label_width {
                return Err(syntax(format!(
                    "label wider than {} columns",
                    self.max_label_width
                )));
            }
            nodes.push(MindmapNode {
                label,
                depth,
                parent: stack.last().map(|(_, idx)| *idx),
            });
            stack.push((indent, nodes.len() - 1));
        }

        if nodes.is_empty() {
            return Err(syntax("mindmap has no root"));
        }
        Ok(nodes)
    }
}

impl DiagramEngine for OutlineEngine {
    fn attempt_render<'a>(
        &'a self,
        id: &'a str,
        source: &'a str,
    ) -> BoxFuture<'a, Result<String, EngineError>> {
        async move { self.render_source(id, source) }.boxed()
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find("%%") {
        Some(i) => &line[..i],
        None => line,
    }
}

fn mindmap_label(text: &str) -> String {
    const SHAPES: &[(&str, &str)] = &[
        ("((", "))"),
        ("))", "(("),
        ("{{", "}}"),
        ("[", "]"),
        ("(", ")"),
        (")", "("),
    ];
    let id_len = text
        .char_indices()
        .find(|(_, ch)| !(ch.is_alphanumeric() || *ch == '_'))
        .map_or(text.len(), |(i, _)| i);
    let rest = &text[id_len..];
    for (open, close) in SHAPES {
        if let Some(inner) = rest.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
            return inner.trim().trim_matches('"').to_string();
        }
    }
    text.to_string()
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn take_until(&mut self, close: &str) -> Option<&'a str> {
        let rest = self.rest();
        let i = rest.find(close)?;
        self.pos += i + close.len();
        Some(&rest[..i])
    }
}

#[derive(Debug, Default)]
struct FlowGraph {
    nodes: Vec<FlowNode>,
    edges: Vec<FlowEdge>,
}

#[derive(Debug)]
struct FlowNode {
    id: String,
    label: String,
}

#[derive(Debug)]
struct FlowEdge {
    from: usize,
    to: usize,
    label: Option<String>,
}

impl FlowGraph {
    fn upsert(&mut self, id: &str, label: Option<String>) -> usize {
        if let Some(idx) = self.nodes.iter().position(|n| n.id == id) {
            if let Some(label) = label {
                self.nodes[idx].label = label;
            }
            return idx;
        }
        self.nodes.push(FlowNode {
            id: id.to_string(),
            label: label.unwrap_or_else(|| id.to_string()),
        });
        self.nodes.len() - 1
    }

    /// Longest-path layering; cycles are cut once a rank reaches the node count.
    fn ranks(&self) -> Vec<usize> {
        let n = self.nodes.len();
        let mut rank = vec![0usize; n];
        for _ in 0..n {
            let mut changed = false;
            for e in &self.edges {
                let candidate = rank[e.from] + 1;
                if e.from != e.to && candidate < n && rank[e.to] < candidate {
                    rank[e.to] = candidate;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        rank
    }
}

#[derive(Debug)]
struct MindmapNode {
    label: String,
    depth: usize,
    parent: Option<usize>,
}

fn render_flow_svg(id: &str, direction: &str, graph: &FlowGraph) -> String {
    let ranks = graph.ranks();
    let max_rank = ranks.iter().copied().max().unwrap_or(0);
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); max_rank + 1];
    for (idx, r) in ranks.iter().enumerate() {
        layers[*r].push(idx);
    }

    let widths: Vec<f64> = graph
        .nodes
        .iter()
        .map(|n| (n.label.width() as f64 * CHAR_WIDTH + 2.0 * PADDING).max(48.0))
        .collect();
    let cell_w = widths.iter().copied().fold(48.0, f64::max);
    let horizontal = matches!(direction, "LR" | "RL");
    let reversed = matches!(direction, "BT" | "RL");

    let mut centers = vec![(0.0, 0.0); graph.nodes.len()];
    for (r, layer) in layers.iter().enumerate() {
        let main = (if reversed { max_rank - r } else { r }) as f64;
        for (k, &node) in layer.iter().enumerate() {
            let cross = k as f64;
            centers[node] = if horizontal {
                (
                    PADDING + main * (cell_w + GAP_X) + cell_w / 2.0,
                    PADDING + cross * (NODE_HEIGHT + GAP_Y) + NODE_HEIGHT / 2.0,
                )
            } else {
                (
                    PADDING + cross * (cell_w + GAP_X) + cell_w / 2.0,
                    PADDING + main * (NODE_HEIGHT + GAP_Y) + NODE_HEIGHT / 2.0,
                )
            };
        }
    }

    let widest_layer = layers.iter().map(Vec::len).max().unwrap_or(1) as f64;
    let (main_len, cross_len) = ((max_rank + 1) as f64, widest_layer);
    let (width, height) = if horizontal {
        (
            2.0 * PADDING + main_len * cell_w + (main_len - 1.0) * GAP_X,
            2.0 * PADDING + cross_len * NODE_HEIGHT + (cross_len - 1.0) * GAP_Y,
        )
    } else {
        (
            2.0 * PADDING + cross_len * cell_w + (cross_len - 1.0) * GAP_X,
            2.0 * PADDING + main_len * NODE_HEIGHT + (main_len - 1.0) * GAP_Y,
        )
    };

    let id_attr = esc_attr(id);
    let mut out = String::new();
    let _ = write!(
        &mut out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" id="{id_attr}" class="lectio-outline lectio-outline-flow" width="{w}" height="{h}" viewBox="0 0 {w} {h}" role="img">"#,
        w = fmt(width),
        h = fmt(height),
    );
    let _ = write!(
        &mut out,
        r#"<defs><marker id="{id_attr}-arrow" viewBox="0 0 10 10" refX="10" refY="5" markerWidth="8" markerHeight="8" orient="auto"><path d="M0,0L10,5L0,10z"/></marker></defs>"#
    );

    for e in &graph.edges {
        let (x1, y1) = centers[e.from];
        let (x2, y2) = centers[e.to];
        let _ = write!(
            &mut out,
            r#"<line class="edge" x1="{}" y1="{}" x2="{}" y2="{}" stroke="currentColor" marker-end="url(#{id_attr}-arrow)"/>"#,
            fmt(x1),
            fmt(y1),
            fmt(x2),
            fmt(y2),
        );
        if let Some(label) = &e.label {
            let _ = write!(
                &mut out,
                r#"<text class="edge-label" x="{}" y="{}" text-anchor="middle">{}</text>"#,
                fmt((x1 + x2) / 2.0),
                fmt((y1 + y2) / 2.0),
                esc(label),
            );
        }
    }

    for ((node, (cx, cy)), w) in graph.nodes.iter().zip(&centers).zip(&widths) {
        let _ = write!(
            &mut out,
            r#"<g class="node" data-id="{}"><rect x="{}" y="{}" width="{}" height="{}" rx="4" fill="none" stroke="currentColor"/><text x="{}" y="{}" text-anchor="middle" dominant-baseline="middle">{}</text></g>"#,
            esc_attr(&node.id),
            fmt(cx - w / 2.0),
            fmt(cy - NODE_HEIGHT / 2.0),
            fmt(*w),
            fmt(NODE_HEIGHT),
            fmt(*cx),
            fmt(*cy),
            esc(&node.label),
        );
    }

    out.push_str("</svg>");
    out
}

fn render_mindmap_svg(id: &str, nodes: &[MindmapNode]) -> String {
    let max_depth = nodes.iter().map(|n| n.depth).max().unwrap_or(0) as f64;
    let widest = nodes.iter().map(|n| n.label.width()).max().unwrap_or(0) as f64;
    let width = 2.0 * PADDING + max_depth * MINDMAP_INDENT + 16.0 + widest * CHAR_WIDTH;
    let height = 2.0 * PADDING + nodes.len() as f64 * MINDMAP_ROW;
    let anchor = |idx: usize| {
        let n = &nodes[idx];
        (
            PADDING + n.depth as f64 * MINDMAP_INDENT + 4.0,
            PADDING + idx as f64 * MINDMAP_ROW + MINDMAP_ROW / 2.0,
        )
    };

    let mut out = String::new();
    let _ = write!(
        &mut out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" id="{}" class="lectio-outline lectio-outline-mindmap" width="{w}" height="{h}" viewBox="0 0 {w} {h}" role="img">"#,
        esc_attr(id),
        w = fmt(width),
        h = fmt(height),
    );
    for (idx, node) in nodes.iter().enumerate() {
        let (x, y) = anchor(idx);
        if let Some(parent) = node.parent {
            let (px, py) = anchor(parent);
            let _ = write!(
                &mut out,
                r#"<path class="branch" d="M{},{}V{}H{}" fill="none" stroke="currentColor"/>"#,
                fmt(px),
                fmt(py),
                fmt(y),
                fmt(x),
            );
        }
        let _ = write!(
            &mut out,
            r#"<g class="node depth-{}"><circle cx="{}" cy="{}" r="4"/><text x="{}" y="{}" dominant-baseline="middle">{}</text></g>"#,
            node.depth,
            fmt(x),
            fmt(y),
            fmt(x + 12.0),
            fmt(y),
            esc(&node.label),
        );
    }
    out.push_str("</svg>");
    out
}
