#![forbid(unsafe_code)]

//! `lectio` repairs machine-generated lesson documents and renders them headlessly.
//!
//! The document model and repair pipeline live in `lectio-core` (re-exported at the root);
//! presentation lives in `lectio-render` (re-exported under [`render`]).
//! [`HeadlessPipeline`] bundles both behind one configuration.

pub use lectio_core::*;

pub mod render {
    pub use lectio_render::html::to_html;
    pub use lectio_render::isolate::{contain, contain_async};
    pub use lectio_render::model::UNAVAILABLE_TEXT;
    pub use lectio_render::retry::{excerpt, prepare_source};
    pub use lectio_render::{
        AttemptResult, BlockRenderer, DiagramEngine, DiagramView, DocumentRenderer, EngineError,
        Error, Node, OutlineEngine, RenderOptions, Result, RetryEngine, RetryState,
        StandardRenderer, StickyCategory, Strategy, classify_sticky, sanitize_id, transition,
    };
}

use lectio_render::{
    DiagramEngine, DocumentRenderer, Node, OutlineEngine, RenderOptions, StandardRenderer,
};

#[derive(Debug, thiserror::Error)]
pub enum HeadlessError {
    #[error(transparent)]
    Document(#[from] lectio_core::Error),
}

pub type Result<T> = std::result::Result<T, HeadlessError>;

/// Output of [`HeadlessPipeline::process`].
#[derive(Debug, Clone)]
pub struct Processed {
    pub outcome: RepairOutcome,
    pub tree: Node,
}

/// Repairer plus renderer sharing one [`LectioConfig`].
///
/// Repair never fails and rendering is total, so the only error a caller sees is an input
/// that is not a document at all.
#[derive(Debug, Clone)]
pub struct HeadlessPipeline<A = NoAssistant, E = OutlineEngine> {
    config: LectioConfig,
    repairer: Repairer<A>,
    renderer: DocumentRenderer<StandardRenderer, E>,
}

impl Default for HeadlessPipeline {
    fn default() -> Self {
        Self::from_parts(LectioConfig::defaults(), NoAssistant, OutlineEngine::default())
    }
}

impl HeadlessPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default assistant and engine with `config`, after validating it.
    pub fn with_config(config: LectioConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, NoAssistant, OutlineEngine::default()))
    }
}

impl<A: RepairAssistant, E: DiagramEngine> HeadlessPipeline<A, E> {
    pub fn from_parts(config: LectioConfig, assistant: A, engine: E) -> Self {
        let options = RenderOptions::from_config(&config);
        Self {
            config,
            repairer: Repairer::new(assistant),
            renderer: DocumentRenderer::new(StandardRenderer, engine, options),
        }
    }

    pub fn config(&self) -> &LectioConfig {
        &self.config
    }

    pub fn repairer(&self) -> &Repairer<A> {
        &self.repairer
    }

    pub fn renderer(&self) -> &DocumentRenderer<StandardRenderer, E> {
        &self.renderer
    }

    pub fn parse(&self, text: &str) -> Result<Document> {
        Ok(Document::from_json(text)?)
    }

    pub async fn repair(&self, document: Document) -> RepairOutcome {
        self.repairer.repair(document).await
    }

    pub fn repair_deterministic(&self, document: Document) -> RepairOutcome {
        self.repairer.repair_deterministic(document)
    }

    /// Synchronous render with diagrams left pending (executor-free).
    pub fn render_tree(&self, document: &Document) -> Node {
        self.renderer.render_tree(document)
    }

    pub async fn render(&self, document: &Document) -> Node {
        self.renderer.render(document).await
    }

    pub async fn render_html(&self, document: &Document) -> String {
        lectio_render::html::to_html(&self.render(document).await)
    }

    /// Parse, repair and render in one go.
    pub async fn process(&self, text: &str) -> Result<Processed> {
        let document = self.parse(text)?;
        let outcome = self.repair(document).await;
        let tree = self.render(&outcome.document).await;
        Ok(Processed { outcome, tree })
    }
}
