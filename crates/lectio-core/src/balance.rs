//! Structural-balance diagnostics over a repaired block sequence. Advisory only.

use crate::schema::{Block, BlockBody};
use serde::Serialize;

pub const MIN_PARAGRAPHS: usize = 8;
pub const MIN_TEXT_TO_VISUAL_RATIO: f64 = 0.5;

const OBJECTIVES_MARKERS: &[&str] = &["objetivos de aprendizagem", "objetivos", "learning objectives"];
const READINGS_MARKERS: &[&str] = &[
    "leituras obrigatórias",
    "leitura obrigatória",
    "leituras",
    "required readings",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReport {
    pub paragraph_count: usize,
    pub visual_count: usize,
    pub has_objectives: bool,
    pub has_required_readings: bool,
    /// Paragraphs per visual block; `None` without visual blocks.
    pub text_to_visual_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BalanceWarning {
    TooFewParagraphs { count: usize, minimum: usize },
    MissingObjectives,
    MissingRequiredReadings,
    LowTextToVisualRatio { ratio: f64, minimum: f64 },
}

impl std::fmt::Display for BalanceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewParagraphs { count, minimum } => {
                write!(f, "only {count} paragraph(s); expected at least {minimum}")
            }
            Self::MissingObjectives => write!(f, "no learning-objectives highlight box"),
            Self::MissingRequiredReadings => write!(f, "no required-readings highlight box"),
            Self::LowTextToVisualRatio { ratio, minimum } => {
                write!(f, "text/visual ratio {ratio:.2} is below {minimum}")
            }
        }
    }
}

fn highlight_title_matches(block: &Block, markers: &[&str]) -> bool {
    if !matches!(block.body, BlockBody::HighlightBox { .. }) {
        return false;
    }
    let Some(title) = block.title.as_deref() else {
        return false;
    };
    let title = title.to_lowercase();
    markers.iter().any(|m| title.contains(m))
}

pub fn measure(blocks: &[Block]) -> BalanceReport {
    let paragraph_count = blocks
        .iter()
        .filter(|b| matches!(b.body, BlockBody::Paragraph { .. }))
        .count();
    let visual_count = blocks.iter().filter(|b| b.is_visual()).count();
    let text_to_visual_ratio =
        (visual_count > 0).then(|| paragraph_count as f64 / visual_count as f64);

    BalanceReport {
        paragraph_count,
        visual_count,
        has_objectives: blocks
            .iter()
            .any(|b| highlight_title_matches(b, OBJECTIVES_MARKERS)),
        has_required_readings: blocks
            .iter()
            .any(|b| highlight_title_matches(b, READINGS_MARKERS)),
        text_to_visual_ratio,
    }
}

impl BalanceReport {
    pub fn warnings(&self) -> Vec<BalanceWarning> {
        let mut out = Vec::new();
        if self.paragraph_count < MIN_PARAGRAPHS {
            out.push(BalanceWarning::TooFewParagraphs {
                count: self.paragraph_count,
                minimum: MIN_PARAGRAPHS,
            });
        }
        if !self.has_objectives {
            out.push(BalanceWarning::MissingObjectives);
        }
        if !self.has_required_readings {
            out.push(BalanceWarning::MissingRequiredReadings);
        }
        if let Some(ratio) = self.text_to_visual_ratio {
            if ratio < MIN_TEXT_TO_VISUAL_RATIO {
                out.push(BalanceWarning::LowTextToVisualRatio {
                    ratio,
                    minimum: MIN_TEXT_TO_VISUAL_RATIO,
                });
            }
        }
        out
    }
}
