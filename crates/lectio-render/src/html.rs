//! HTML serialization of a presentation tree.
//!
//! Plain-text fields are escaped; markup fields are emitted as-is because they have already
//! been restricted to the inline allow-list.

use crate::model::{DiagramView, Node, UNAVAILABLE_TEXT};
use lectio_core::ChartKind;
use std::fmt::Write as _;

fn esc(text: &str) -> String {
    htmlize::escape_text(text).into_owned()
}

fn esc_attr(text: &str) -> String {
    htmlize::escape_attribute(text).into_owned()
}

fn percent(value: f64, of: f64) -> f64 {
    if of > 0.0 && value.is_finite() {
        (value / of * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

pub fn to_html(node: &Node) -> String {
    let mut out = String::new();
    write_node(&mut out, node);
    out
}

fn write_title(out: &mut String, title: Option<&str>, tag: &str) {
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        let _ = write!(out, "<{tag} class=\"lectio-title\">{title}</{tag}>");
    }
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Document { title, children } => {
            out.push_str("<article class=\"lectio-document\">");
            write_title(out, Some(title.as_str()), "h1");
            for child in children {
                write_node(out, child);
            }
            out.push_str("</article>");
        }
        Node::Heading { id, level, markup } => {
            let _ = write!(out, "<h{level} id=\"{}\">{markup}</h{level}>", esc_attr(id));
        }
        Node::Paragraph { id, markup } => {
            let _ = write!(
                out,
                "<div class=\"lectio-paragraph\" id=\"{}\">{markup}</div>",
                esc_attr(id)
            );
        }
        Node::HighlightBox { id, title, markup } => {
            let _ = write!(out, "<aside class=\"lectio-highlight\" id=\"{}\">", esc_attr(id));
            write_title(out, title.as_deref(), "h3");
            let _ = write!(out, "<div class=\"lectio-body\">{markup}</div></aside>");
        }
        Node::Sticky {
            id,
            category,
            markup,
        } => {
            let _ = write!(
                out,
                "<aside class=\"lectio-sticky lectio-sticky-{cat}\" id=\"{}\" data-category=\"{cat}\">{markup}</aside>",
                esc_attr(id),
                cat = category.as_str(),
            );
        }
        Node::Diagram {
            id,
            diagram_kind,
            title,
            caption,
            view,
        } => {
            let _ = write!(
                out,
                "<figure class=\"lectio-diagram lectio-diagram-{}\" id=\"{}\">",
                diagram_kind.as_str(),
                esc_attr(id)
            );
            write_title(out, title.as_deref(), "h3");
            write_diagram_view(out, view);
            if let Some(caption) = caption {
                let _ = write!(out, "<figcaption>{caption}</figcaption>");
            }
            out.push_str("</figure>");
        }
        Node::Chart {
            id,
            chart_kind,
            title,
            caption,
            series,
            total,
            max,
        } => {
            let _ = write!(
                out,
                "<figure class=\"lectio-chart lectio-chart-{}\" id=\"{}\">",
                chart_kind.as_str(),
                esc_attr(id)
            );
            write_title(out, title.as_deref(), "h3");
            out.push_str("<table><tbody>");
            for point in series {
                let share = match chart_kind {
                    ChartKind::Pie => percent(point.value, *total),
                    ChartKind::Bar | ChartKind::Line => percent(point.value, *max),
                };
                let _ = write!(
                    out,
                    "<tr><th scope=\"row\">{}</th><td>{}</td><td><span class=\"lectio-bar\" style=\"width: {share:.1}%\"></span></td></tr>",
                    esc(&point.category),
                    point.value,
                );
            }
            out.push_str("</tbody></table>");
            if let Some(caption) = caption {
                let _ = write!(out, "<figcaption>{caption}</figcaption>");
            }
            out.push_str("</figure>");
        }
        Node::ExpandableSections {
            id,
            title,
            sections,
        } => {
            let _ = write!(out, "<section class=\"lectio-sections\" id=\"{}\">", esc_attr(id));
            write_title(out, title.as_deref(), "h3");
            for section in sections {
                let _ = write!(
                    out,
                    "<details><summary>{}</summary><div class=\"lectio-body\">{}</div></details>",
                    section.trigger, section.content
                );
            }
            out.push_str("</section>");
        }
        Node::GuidelineList { id, title, items } => {
            let _ = write!(out, "<section class=\"lectio-guidelines\" id=\"{}\">", esc_attr(id));
            write_title(out, title.as_deref(), "h3");
            out.push_str("<ul>");
            for item in items {
                let _ = write!(out, "<li>{item}</li>");
            }
            out.push_str("</ul></section>");
        }
        Node::ReferenceList { id, title, items } => {
            let _ = write!(out, "<section class=\"lectio-references\" id=\"{}\">", esc_attr(id));
            write_title(out, title.as_deref(), "h3");
            // Items already end with the double-break separator.
            out.push_str("<div class=\"lectio-body\">");
            for item in items {
                out.push_str(item);
            }
            out.push_str("</div></section>");
        }
        Node::UnsupportedKind { id, kind } => {
            let _ = write!(
                out,
                "<div class=\"lectio-unsupported\" id=\"{}\" role=\"note\">Block type not supported: <code>{}</code></div>",
                esc_attr(id),
                esc(kind)
            );
        }
        Node::UnsupportedComponent { id, component_name } => {
            let _ = write!(
                out,
                "<div class=\"lectio-unsupported\" id=\"{}\" role=\"note\">Component not supported: <code>{}</code></div>",
                esc_attr(id),
                esc(component_name)
            );
        }
        Node::Unavailable { id } => {
            let _ = write!(
                out,
                "<div class=\"lectio-unavailable\" id=\"{}\" role=\"alert\">{UNAVAILABLE_TEXT}</div>",
                esc_attr(id)
            );
        }
    }
}

fn write_diagram_view(out: &mut String, view: &DiagramView) {
    match view {
        DiagramView::Pending { source } => {
            let _ = write!(
                out,
                "<pre class=\"lectio-diagram-source\" data-state=\"pending\">{}</pre>",
                esc(source)
            );
        }
        DiagramView::Rendered {
            strategy, markup, ..
        } => {
            let _ = write!(
                out,
                "<div class=\"lectio-diagram-canvas\" data-state=\"rendered\" data-strategy=\"{}\">{markup}</div>",
                strategy.as_str()
            );
        }
        DiagramView::Failed { excerpt, .. } => {
            let _ = write!(
                out,
                "<div class=\"lectio-diagram-failed\" data-state=\"failed\" role=\"alert\"><p>Diagram could not be rendered.</p><pre>{}</pre></div>",
                esc(excerpt)
            );
        }
        DiagramView::Cancelled => {
            out.push_str("<div class=\"lectio-diagram-cancelled\" data-state=\"cancelled\"></div>");
        }
    }
}
