//! Graph-grammar text handling: top-level keyword recognition and the normalizing rewrites
//! applied before a diagram source reaches a diagram engine.

mod normalize;

pub use normalize::{
    DiagramNormalization, LABEL_MAX_CHARS, add_space_after_keyword, normalize_diagram_source,
    normalize_diagram_source_with, replace_arrow_glyphs, strip_label_parentheses,
    strip_label_quotes, truncate_labels, unwrap_code_fence,
};

const DIRECTIONS: &[&str] = &["TD", "TB", "BT", "RL", "LR"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordMatch {
    pub keyword: &'static str,
    /// The keyword is immediately followed by a direction token (`graphTD`).
    pub glued_direction: bool,
}

#[derive(Debug, Clone)]
pub struct KeywordRegistry {
    keywords: Vec<&'static str>,
}

impl KeywordRegistry {
    pub fn new() -> Self {
        Self {
            keywords: Vec::new(),
        }
    }

    pub fn add(&mut self, keyword: &'static str) {
        self.keywords.push(keyword);
    }

    pub fn keywords(&self) -> &[&'static str] {
        &self.keywords
    }

    pub fn default_lectio() -> Self {
        let mut reg = Self::new();

        // Order is significant: longer keywords sharing a prefix come first.
        reg.add("flowchart");
        reg.add("graph");
        reg.add("mindmap");
        reg.add("sequenceDiagram");
        reg.add("classDiagram");
        reg.add("stateDiagram-v2");
        reg.add("stateDiagram");
        reg.add("erDiagram");
        reg.add("gantt");
        reg.add("pie");
        reg.add("journey");
        reg.add("timeline");
        reg.add("gitGraph");
        reg.add("quadrantChart");
        reg.add("block-beta");

        reg
    }

    /// Matches the first keyword of `text`, ignoring leading whitespace.
    pub fn match_keyword(&self, text: &str) -> Option<KeywordMatch> {
        let text = text.trim_start();
        for &keyword in &self.keywords {
            let Some(rest) = text.strip_prefix(keyword) else {
                continue;
            };
            if rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == ';') {
                return Some(KeywordMatch {
                    keyword,
                    glued_direction: false,
                });
            }
            let glued = DIRECTIONS.iter().any(|dir| {
                rest.strip_prefix(dir).is_some_and(|after| {
                    after.is_empty() || after.starts_with(|c: char| c.is_whitespace() || c == ';')
                })
            });
            if glued {
                return Some(KeywordMatch {
                    keyword,
                    glued_direction: true,
                });
            }
        }
        None
    }

    pub fn starts_with_keyword(&self, text: &str) -> bool {
        self.match_keyword(text).is_some()
    }
}

impl Default for KeywordRegistry {
    fn default() -> Self {
        Self::default_lectio()
    }
}
