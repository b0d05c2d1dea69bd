//! Block → presentation node mapping.

use crate::Result;
use crate::model::{DiagramView, Node};
use lectio_core::schema::{expandable_sections, is_expandable_component};
use lectio_core::{Block, BlockBody, ChartPoint, ExpandableSection, references, sanitize};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StickyCategory {
    Warning,
    Tip,
    Reflection,
    Application,
    Info,
}

impl StickyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Tip => "tip",
            Self::Reflection => "reflection",
            Self::Application => "application",
            Self::Info => "info",
        }
    }
}

// Checked in order; the first category with a matching keyword wins.
const STICKY_KEYWORDS: &[(StickyCategory, &[&str])] = &[
    (
        StickyCategory::Warning,
        &[
            "atenção", "atencao", "cuidado", "alerta", "aviso", "importante", "warning", "caution",
            "attention",
        ],
    ),
    (
        StickyCategory::Tip,
        &["dica", "sugestão", "sugestao", "tip", "hint"],
    ),
    (
        StickyCategory::Reflection,
        &["reflita", "reflexão", "reflexao", "pense", "reflect", "think about"],
    ),
    (
        StickyCategory::Application,
        &[
            "aplicação", "aplicacao", "aplique", "na prática", "na pratica", "exemplo prático",
            "application", "in practice",
        ],
    ),
];

/// Derives a sticky note's category from its (sanitized) text. Defaults to `Info`.
pub fn classify_sticky(text: &str) -> StickyCategory {
    let text = text.to_lowercase();
    STICKY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map_or(StickyCategory::Info, |(category, _)| *category)
}

pub fn block_id(index: usize) -> String {
    format!("block-{index}")
}

/// Maps one block to its presentation node. Implementations may fail; callers wrap them in
/// [`crate::isolate`].
pub trait BlockRenderer {
    fn render_block(&self, index: usize, block: &Block) -> Result<Node>;
}

/// Total renderer over every block kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRenderer;

impl BlockRenderer for StandardRenderer {
    fn render_block(&self, index: usize, block: &Block) -> Result<Node> {
        Ok(render_block(index, block))
    }
}

/// Markup and title fields are re-sanitized, so unrepaired documents render safely too.
pub fn render_block(index: usize, block: &Block) -> Node {
    let id = block_id(index);
    let title = block.title.as_deref().map(sanitize);
    let caption = block.description.as_deref().map(sanitize);

    match &block.body {
        BlockBody::Heading { level, text } => Node::Heading {
            id,
            level: (*level).clamp(2, 4),
            markup: sanitize(text),
        },
        BlockBody::Paragraph { text } => Node::Paragraph {
            id,
            markup: sanitize(text),
        },
        BlockBody::HighlightBox { text } => Node::HighlightBox {
            id,
            title,
            markup: sanitize(text),
        },
        BlockBody::Sticky { text } => {
            let markup = sanitize(text);
            Node::Sticky {
                id,
                category: classify_sticky(&markup),
                markup,
            }
        }
        BlockBody::Diagram {
            diagram_kind,
            graph_source,
        } => Node::Diagram {
            id,
            diagram_kind: *diagram_kind,
            title,
            caption,
            view: DiagramView::Pending {
                source: graph_source.clone(),
            },
        },
        BlockBody::Chart { chart_kind, series } => {
            let (total, max) = chart_scale(series);
            Node::Chart {
                id,
                chart_kind: *chart_kind,
                title,
                caption,
                series: series.clone(),
                total,
                max,
            }
        }
        BlockBody::Composite {
            component_name,
            props,
        } => {
            if is_expandable_component(component_name) {
                Node::ExpandableSections {
                    id,
                    title,
                    sections: expandable_sections(props)
                        .into_iter()
                        .map(|section| ExpandableSection {
                            trigger: sanitize(&section.trigger),
                            content: sanitize(&section.content),
                        })
                        .collect(),
                }
            } else {
                Node::UnsupportedComponent {
                    id,
                    component_name: component_name.clone(),
                }
            }
        }
        BlockBody::GuidelineList { items } => Node::GuidelineList {
            id,
            title,
            items: items
                .iter()
                .map(|item| sanitize(item))
                .filter(|item| !item.trim().is_empty())
                .collect(),
        },
        BlockBody::ReferenceList { source } => Node::ReferenceList {
            id,
            title,
            items: references::reference_items(source),
        },
        BlockBody::Unknown { original_kind } => Node::UnsupportedKind {
            id,
            kind: original_kind.clone(),
        },
    }
}

fn chart_scale(series: &[ChartPoint]) -> (f64, f64) {
    let mut total = 0.0;
    let mut max: f64 = 0.0;
    for point in series.iter().filter(|p| p.value.is_finite()) {
        max = max.max(point.value);
        if point.value >= 0.0 {
            total += point.value;
        }
    }
    (total, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectio_core::{ChartKind, DiagramKind};
    use serde_json::json;

    #[test]
    fn sticky_categories_follow_table_order() {
        assert_eq!(classify_sticky("<strong>Atenção:</strong> unidades!"), StickyCategory::Warning);
        assert_eq!(classify_sticky("Dica: revise o capítulo"), StickyCategory::Tip);
        assert_eq!(classify_sticky("Reflita sobre o exemplo"), StickyCategory::Reflection);
        assert_eq!(classify_sticky("In practice, engineers..."), StickyCategory::Application);
        assert_eq!(classify_sticky("Nada de especial"), StickyCategory::Info);
        // Both a warning and a tip keyword: warning is checked first.
        assert_eq!(classify_sticky("Dica importante"), StickyCategory::Warning);
    }

    #[test]
    fn unknown_kinds_render_a_visible_notice() {
        let block = Block::from_value(&json!({ "kind": "frobnicate" }));
        assert_eq!(
            render_block(3, &block),
            Node::UnsupportedKind {
                id: "block-3".to_string(),
                kind: "frobnicate".to_string()
            }
        );
    }

    #[test]
    fn unsupported_components_carry_their_name() {
        let block = Block::from_value(&json!({ "kind": "composite", "componentName": "Carousel" }));
        assert_eq!(
            render_block(0, &block),
            Node::UnsupportedComponent {
                id: "block-0".to_string(),
                component_name: "Carousel".to_string()
            }
        );
    }

    #[test]
    fn every_kind_renders() {
        let blocks = [
            Block::heading(2, "H"),
            Block::paragraph("p"),
            Block::highlight_box("Objetivos", "x"),
            Block::sticky("Dica"),
            Block::diagram(DiagramKind::Flow, "graph TD"),
            Block::from_value(&json!({ "kind": "chart", "series": [] })),
            Block::from_value(&json!({ "kind": "composite", "componentName": "accordion", "props": [] })),
            Block::from_value(&json!({ "kind": "guidelineList", "items": ["a"] })),
            Block::from_value(&json!({ "kind": "referenceList", "texto": "[1] A [2] B" })),
            Block::unknown("frobnicate"),
        ];
        for (i, block) in blocks.iter().enumerate() {
            let node = StandardRenderer.render_block(i, block).unwrap();
            assert_eq!(node.id(), format!("block-{i}"));
        }
    }

    #[test]
    fn diagrams_start_pending_with_their_source() {
        let node = render_block(1, &Block::diagram(DiagramKind::Mindmap, "mindmap\n  root"));
        assert_eq!(node.pending_diagram_source(), Some("mindmap\n  root"));
    }

    #[test]
    fn chart_scale_ignores_negative_and_non_finite_values_in_the_total() {
        let block = Block::new(BlockBody::Chart {
            chart_kind: ChartKind::Pie,
            series: vec![
                ChartPoint { category: "a".into(), value: 3.0 },
                ChartPoint { category: "b".into(), value: -1.0 },
                ChartPoint { category: "c".into(), value: f64::NAN },
                ChartPoint { category: "d".into(), value: 5.0 },
            ],
        });
        let Node::Chart { total, max, series, .. } = render_block(0, &block) else {
            panic!("expected chart");
        };
        assert_eq!(total, 8.0);
        assert_eq!(max, 5.0);
        assert_eq!(series.len(), 4);
    }

    #[test]
    fn unrepaired_free_text_references_are_split_at_render_time() {
        let block = Block::from_value(&json!({ "kind": "referenceList", "texto": "[1] A [2] B" }));
        let Node::ReferenceList { items, .. } = render_block(0, &block) else {
            panic!("expected references");
        };
        assert_eq!(items, ["[1] A<br><br>", "[2] B<br><br>"]);
    }

    #[test]
    fn unrepaired_titles_and_markup_are_sanitized() {
        let block = Block::highlight_box(
            "<script>x</script>Objetivos <em>1",
            "<div onclick=\"y\">a</div> <img src=x",
        );
        let Node::HighlightBox { title, markup, .. } = render_block(0, &block) else {
            panic!("expected highlight box");
        };
        assert_eq!(title.as_deref(), Some("Objetivos <em>1</em>"));
        assert_eq!(markup, "a &lt;img src=x");

        let block = Block::from_value(&json!({ "kind": "guidelineList", "items": ["<b>a</b>", "<div> </div>"] }));
        let Node::GuidelineList { items, .. } = render_block(1, &block) else {
            panic!("expected guidelines");
        };
        assert_eq!(items, ["a"]);
    }
}
