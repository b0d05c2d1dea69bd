use crate::block::StickyCategory;
use crate::retry::Strategy;
use lectio_core::{ChartKind, ChartPoint, DiagramKind, ExpandableSection};
use serde::Serialize;

/// Text shown in place of a subtree whose rendering faulted.
pub const UNAVAILABLE_TEXT: &str = "Visualization unavailable";

/// Presentation tree. Markup fields carry already-sanitized inline HTML; every other string is
/// plain text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Node {
    Document {
        title: String,
        children: Vec<Node>,
    },
    Heading {
        id: String,
        level: u8,
        markup: String,
    },
    Paragraph {
        id: String,
        markup: String,
    },
    HighlightBox {
        id: String,
        title: Option<String>,
        markup: String,
    },
    Sticky {
        id: String,
        category: StickyCategory,
        markup: String,
    },
    Diagram {
        id: String,
        diagram_kind: DiagramKind,
        title: Option<String>,
        caption: Option<String>,
        view: DiagramView,
    },
    Chart {
        id: String,
        chart_kind: ChartKind,
        title: Option<String>,
        caption: Option<String>,
        series: Vec<ChartPoint>,
        /// Sum of the finite, non-negative values.
        total: f64,
        max: f64,
    },
    ExpandableSections {
        id: String,
        title: Option<String>,
        sections: Vec<ExpandableSection>,
    },
    GuidelineList {
        id: String,
        title: Option<String>,
        items: Vec<String>,
    },
    ReferenceList {
        id: String,
        title: Option<String>,
        items: Vec<String>,
    },
    UnsupportedKind {
        id: String,
        kind: String,
    },
    UnsupportedComponent {
        id: String,
        component_name: String,
    },
    Unavailable {
        id: String,
    },
}

impl Node {
    pub fn unavailable(id: impl Into<String>) -> Self {
        Self::Unavailable { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Document { .. } => "document",
            Self::Heading { id, .. }
            | Self::Paragraph { id, .. }
            | Self::HighlightBox { id, .. }
            | Self::Sticky { id, .. }
            | Self::Diagram { id, .. }
            | Self::Chart { id, .. }
            | Self::ExpandableSections { id, .. }
            | Self::GuidelineList { id, .. }
            | Self::ReferenceList { id, .. }
            | Self::UnsupportedKind { id, .. }
            | Self::UnsupportedComponent { id, .. }
            | Self::Unavailable { id } => id.as_str(),
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Self::Document { children, .. } => children.as_slice(),
            _ => &[],
        }
    }

    /// Source of a diagram still waiting for the retry engine.
    pub fn pending_diagram_source(&self) -> Option<&str> {
        match self {
            Self::Diagram {
                view: DiagramView::Pending { source },
                ..
            } => Some(source.as_str()),
            _ => None,
        }
    }

    pub fn diagram_view(&self) -> Option<&DiagramView> {
        match self {
            Self::Diagram { view, .. } => Some(view),
            _ => None,
        }
    }

    /// Replaces the view of a diagram node; other nodes are left alone.
    pub fn set_diagram_view(&mut self, new_view: DiagramView) {
        if let Self::Diagram { view, .. } = self {
            *view = new_view;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DiagramView {
    Pending {
        source: String,
    },
    Rendered {
        strategy: Strategy,
        /// 1-based attempt number.
        attempt: usize,
        render_id: String,
        markup: String,
    },
    /// Every strategy failed; `excerpt` is a prefix of the original source.
    Failed {
        excerpt: String,
        attempts: usize,
    },
    Cancelled,
}

impl DiagramView {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }
}
