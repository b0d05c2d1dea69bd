//! Lesson document model.
//!
//! Serialization always writes the canonical camelCase shape. Deserialization goes through
//! [`Block::from_value`], which accepts the loose shapes generators actually produce (alternate
//! tag keys, aliased kind names, stringly typed numbers) instead of rejecting the payload.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Trailing marker that separates reference items in presentation.
pub const REFERENCE_SENTINEL: &str = "<br><br>";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub general_title: String,
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(general_title: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            general_title: general_title.into(),
            blocks,
        }
    }

    /// Parses a generator payload. Fails only when the text is not JSON or is neither an
    /// object nor an array of blocks.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(obj) => {
                let general_title = string_field(obj, &["generalTitle", "general_title", "title"])
                    .unwrap_or_default();
                let blocks = ["blocks", "blocos"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_array))
                    .map(|arr| arr.iter().map(Block::from_value).collect())
                    .unwrap_or_default();
                Ok(Self {
                    general_title,
                    blocks,
                })
            }
            Value::Array(arr) => Ok(Self {
                general_title: String::new(),
                blocks: arr.iter().map(Block::from_value).collect(),
            }),
            other => Err(Error::InvalidDocument {
                message: format!("expected an object or an array of blocks, got {}", type_name(other)),
            }),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Document::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub body: BlockBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BlockBody {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph {
        text: String,
    },
    HighlightBox {
        text: String,
    },
    Sticky {
        text: String,
    },
    Diagram {
        diagram_kind: DiagramKind,
        graph_source: String,
    },
    Chart {
        chart_kind: ChartKind,
        series: Vec<ChartPoint>,
    },
    Composite {
        component_name: String,
        props: Value,
    },
    GuidelineList {
        items: Vec<String>,
    },
    ReferenceList {
        #[serde(flatten)]
        source: ReferenceSource,
    },
    Unknown {
        original_kind: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramKind {
    Flow,
    Mindmap,
    Schematic,
}

impl DiagramKind {
    pub fn parse_lenient(s: &str) -> Self {
        match normalize_key(s).as_str() {
            "mindmap" | "mapamental" => Self::Mindmap,
            "schematic" | "esquema" | "esquematico" => Self::Schematic,
            _ => Self::Flow,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::Mindmap => "mindmap",
            Self::Schematic => "schematic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Pie,
    Line,
}

impl ChartKind {
    pub fn parse_lenient(s: &str) -> Self {
        match normalize_key(s).as_str() {
            "pie" | "pizza" | "donut" => Self::Pie,
            "line" | "linha" => Self::Line,
            _ => Self::Bar,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Pie => "pie",
            Self::Line => "line",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub category: String,
    pub value: f64,
}

/// Reference list payload. `FreeText` only exists before normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReferenceSource {
    #[serde(rename = "itens")]
    Items(Vec<String>),
    #[serde(rename = "texto")]
    FreeText(String),
}

/// One `{trigger, content}` pair of the expandable-sections component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandableSection {
    pub trigger: String,
    pub content: String,
}

const EXPANDABLE_COMPONENT_NAMES: &[&str] = &["accordion", "expandable", "expandablesections"];

/// Whether `component_name` names the one composite component the renderer understands.
pub fn is_expandable_component(component_name: &str) -> bool {
    EXPANDABLE_COMPONENT_NAMES.contains(&normalize_key(component_name).as_str())
}

/// Reads the `{trigger, content}` pairs from composite props.
pub fn expandable_sections(props: &Value) -> Vec<ExpandableSection> {
    let Some(items) = props
        .as_object()
        .and_then(|o| ["items", "sections", "itens"].iter().find_map(|k| o.get(*k)))
        .or_else(|| props.is_array().then_some(props))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let trigger = string_field(obj, &["trigger", "title", "titulo"])?;
            let content = string_field(obj, &["content", "text", "conteudo"]).unwrap_or_default();
            Some(ExpandableSection { trigger, content })
        })
        .collect()
}

impl Block {
    pub fn new(body: BlockBody) -> Self {
        Self {
            title: None,
            description: None,
            body,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::new(BlockBody::Heading {
            level: level.clamp(2, 4),
            text: text.into(),
        })
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockBody::Paragraph { text: text.into() })
    }

    pub fn highlight_box(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(BlockBody::HighlightBox { text: text.into() }).with_title(title)
    }

    pub fn sticky(text: impl Into<String>) -> Self {
        Self::new(BlockBody::Sticky { text: text.into() })
    }

    pub fn diagram(kind: DiagramKind, graph_source: impl Into<String>) -> Self {
        Self::new(BlockBody::Diagram {
            diagram_kind: kind,
            graph_source: graph_source.into(),
        })
    }

    pub fn unknown(original_kind: impl Into<String>) -> Self {
        Self::new(BlockBody::Unknown {
            original_kind: original_kind.into(),
        })
    }

    /// The canonical `kind` tag written on serialization.
    pub fn kind_name(&self) -> &'static str {
        match &self.body {
            BlockBody::Heading { .. } => "heading",
            BlockBody::Paragraph { .. } => "paragraph",
            BlockBody::HighlightBox { .. } => "highlightBox",
            BlockBody::Sticky { .. } => "sticky",
            BlockBody::Diagram { .. } => "diagram",
            BlockBody::Chart { .. } => "chart",
            BlockBody::Composite { .. } => "composite",
            BlockBody::GuidelineList { .. } => "guidelineList",
            BlockBody::ReferenceList { .. } => "referenceList",
            BlockBody::Unknown { .. } => "unknown",
        }
    }

    /// Sticky, diagram, chart, guideline list and composite blocks count as visual.
    pub fn is_visual(&self) -> bool {
        matches!(
            self.body,
            BlockBody::Sticky { .. }
                | BlockBody::Diagram { .. }
                | BlockBody::Chart { .. }
                | BlockBody::GuidelineList { .. }
                | BlockBody::Composite { .. }
        )
    }

    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::unknown(type_name(value));
        };

        let raw_kind = string_field(obj, &["kind", "type", "tipo"]).unwrap_or_default();
        let title = string_field(obj, &["title", "titulo"]);
        let description = string_field(obj, &["description", "descricao"]);

        let body = match normalize_key(&raw_kind).as_str() {
            "heading" | "header" | "titulo" => BlockBody::Heading {
                level: heading_level(obj),
                text: text_field(obj),
            },
            "paragraph" | "paragrafo" => BlockBody::Paragraph {
                text: text_field(obj),
            },
            "highlightbox" | "highlight" | "callout" | "destaque" => BlockBody::HighlightBox {
                text: text_field(obj),
            },
            "sticky" | "stickynote" | "note" | "nota" => BlockBody::Sticky {
                text: text_field(obj),
            },
            "diagram" | "mermaid" | "diagrama" => BlockBody::Diagram {
                diagram_kind: string_field(obj, &["diagramKind", "diagramType", "variant"])
                    .map(|s| DiagramKind::parse_lenient(&s))
                    .unwrap_or(DiagramKind::Flow),
                graph_source: string_field(obj, &["graphSource", "source", "code", "mermaid"])
                    .unwrap_or_default(),
            },
            "chart" | "grafico" => BlockBody::Chart {
                chart_kind: string_field(obj, &["chartKind", "chartType", "variant"])
                    .map(|s| ChartKind::parse_lenient(&s))
                    .unwrap_or(ChartKind::Bar),
                series: chart_series(obj),
            },
            "composite" | "component" | "componente" => BlockBody::Composite {
                component_name: string_field(obj, &["componentName", "component", "name"])
                    .unwrap_or_default(),
                props: obj.get("props").cloned().unwrap_or(Value::Null),
            },
            "guidelinelist" | "guidelines" | "diretrizes" => BlockBody::GuidelineList {
                items: string_items(obj, &["items", "itens"]),
            },
            "referencelist" | "references" | "bibliography" | "referencias" => {
                BlockBody::ReferenceList {
                    source: reference_source(obj),
                }
            }
            "unknown" => BlockBody::Unknown {
                original_kind: string_field(obj, &["originalKind"]).unwrap_or_default(),
            },
            _ => BlockBody::Unknown {
                original_kind: raw_kind,
            },
        };

        Self {
            title,
            description,
            body,
        }
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Block::from_value(&value))
    }
}

fn normalize_key(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn text_field(obj: &Map<String, Value>) -> String {
    string_field(obj, &["text", "content", "html", "texto"]).unwrap_or_default()
}

fn heading_level(obj: &Map<String, Value>) -> u8 {
    let level = match obj.get("level").or_else(|| obj.get("nivel")) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(2.0),
        Some(Value::String(s)) => s.trim().trim_start_matches(['h', 'H']).parse().unwrap_or(2.0),
        _ => 2.0,
    };
    level.clamp(2.0, 4.0) as u8
}

fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn chart_series(obj: &Map<String, Value>) -> Vec<ChartPoint> {
    let Some(points) = ["series", "data", "dados"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array))
    else {
        return Vec::new();
    };

    points
        .iter()
        .filter_map(|p| {
            let p = p.as_object()?;
            let category = string_field(p, &["category", "label", "name", "categoria"])?;
            let value = ["value", "valor", "y"]
                .iter()
                .find_map(|k| p.get(*k).and_then(value_as_number))?;
            Some(ChartPoint { category, value })
        })
        .collect()
}

fn item_as_string(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(o) => string_field(o, &["text", "content", "texto"]),
        _ => None,
    }
}

fn string_items(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array))
        .map(|arr| arr.iter().filter_map(item_as_string).collect())
        .unwrap_or_default()
}

fn reference_source(obj: &Map<String, Value>) -> ReferenceSource {
    for key in ["itens", "items", "texto", "text"] {
        match obj.get(key) {
            Some(Value::Array(arr)) => {
                return ReferenceSource::Items(arr.iter().filter_map(item_as_string).collect());
            }
            Some(Value::String(s)) => return ReferenceSource::FreeText(s.clone()),
            _ => {}
        }
    }
    ReferenceSource::Items(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unrecognized_kind_becomes_unknown_with_original_name() {
        let block = Block::from_value(&json!({ "kind": "frobnicate", "text": "x" }));
        assert_eq!(
            block.body,
            BlockBody::Unknown {
                original_kind: "frobnicate".to_string()
            }
        );
    }

    #[test]
    fn kind_aliases_and_alternate_tag_keys_are_accepted() {
        let block = Block::from_value(&json!({ "type": "highlight_box", "title": "Objetivos", "content": "x" }));
        assert_eq!(block.kind_name(), "highlightBox");
        assert_eq!(block.title.as_deref(), Some("Objetivos"));

        let block = Block::from_value(&json!({ "tipo": "Mermaid", "code": "graph TD" }));
        assert_eq!(block.kind_name(), "diagram");
    }

    #[test]
    fn heading_level_is_clamped_and_parsed_from_strings() {
        let block = Block::from_value(&json!({ "kind": "heading", "level": 7, "text": "x" }));
        assert!(matches!(block.body, BlockBody::Heading { level: 4, .. }));
        let block = Block::from_value(&json!({ "kind": "heading", "level": "h3", "text": "x" }));
        assert!(matches!(block.body, BlockBody::Heading { level: 3, .. }));
    }

    #[test]
    fn chart_points_accept_stringly_values_and_drop_garbage() {
        let block = Block::from_value(&json!({
            "kind": "chart",
            "chartKind": "pie",
            "data": [
                { "label": "A", "value": "40%" },
                { "category": "B", "value": 60 },
                { "category": "C", "value": "n/a" }
            ]
        }));
        let BlockBody::Chart { chart_kind, series } = block.body else {
            panic!("expected chart");
        };
        assert_eq!(chart_kind, ChartKind::Pie);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].value, 40.0);
    }

    #[test]
    fn reference_list_keeps_free_text_until_normalized() {
        let block = Block::from_value(&json!({ "kind": "referenceList", "title": "Refs", "texto": "[1] Foo" }));
        assert_eq!(
            block.body,
            BlockBody::ReferenceList {
                source: ReferenceSource::FreeText("[1] Foo".to_string())
            }
        );
    }

    #[test]
    fn serialization_writes_canonical_shape() {
        let block = Block::new(BlockBody::ReferenceList {
            source: ReferenceSource::Items(vec!["Foo<br><br>".to_string()]),
        })
        .with_title("Refs");
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({ "title": "Refs", "kind": "referenceList", "itens": ["Foo<br><br>"] })
        );

        let block = Block::diagram(DiagramKind::Mindmap, "mindmap\n  root");
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({ "kind": "diagram", "diagramKind": "mindmap", "graphSource": "mindmap\n  root" })
        );
    }

    #[test]
    fn serialized_documents_parse_back_to_the_same_value() {
        let doc = Document::new(
            "Hydrostatics",
            vec![
                Block::heading(2, "Intro"),
                Block::paragraph("<strong>x</strong>"),
                Block::unknown("frobnicate"),
            ],
        );
        let text = serde_json::to_string(&doc).unwrap();
        assert_eq!(Document::from_json(&text).unwrap(), doc);
    }

    #[test]
    fn documents_accept_bare_block_arrays_and_reject_scalars() {
        let doc = Document::from_json(r#"[{"kind":"paragraph","text":"x"}]"#).unwrap();
        assert_eq!(doc.blocks.len(), 1);
        assert!(Document::from_json("42").is_err());
        assert!(Document::from_json("{not json").is_err());
    }

    #[test]
    fn expandable_sections_read_items_from_props() {
        assert!(is_expandable_component("Accordion"));
        assert!(is_expandable_component("expandable-sections"));
        assert!(!is_expandable_component("Tabs"));

        let sections = expandable_sections(&json!({
            "items": [
                { "trigger": "Q1", "content": "A1" },
                { "content": "no trigger" },
                { "trigger": "Q2" }
            ]
        }));
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].content, "");
    }
}
