//! Whole-document rendering: blocks in order, diagrams resolved concurrently across blocks,
//! fault boundaries around each block, each diagram and the document itself.

use crate::block::{BlockRenderer, StandardRenderer, block_id};
use crate::isolate;
use crate::model::{DiagramView, Node};
use crate::outline::OutlineEngine;
use crate::retry::{DiagramEngine, RetryEngine};
use crate::{Error, RenderOptions};
use futures::FutureExt;
use futures::future::{AbortHandle, Abortable, join_all};
use lectio_core::{Document, sanitize};
use std::future::Future;

#[derive(Debug, Clone)]
pub struct DocumentRenderer<R = StandardRenderer, E = OutlineEngine> {
    blocks: R,
    diagrams: RetryEngine<E>,
}

impl Default for DocumentRenderer {
    fn default() -> Self {
        Self::new(
            StandardRenderer,
            OutlineEngine::default(),
            RenderOptions::default(),
        )
    }
}

impl<R: BlockRenderer, E: DiagramEngine> DocumentRenderer<R, E> {
    pub fn new(blocks: R, engine: E, options: RenderOptions) -> Self {
        Self {
            blocks,
            diagrams: RetryEngine::new(engine, options),
        }
    }

    pub fn retry_engine(&self) -> &RetryEngine<E> {
        &self.diagrams
    }

    /// Renders every block; diagram views stay [`DiagramView::Pending`]. Synchronous and
    /// executor-free.
    pub fn render_tree(&self, document: &Document) -> Node {
        let tree = isolate::contain("document", || {
            let children = document
                .blocks
                .iter()
                .enumerate()
                .map(|(index, block)| {
                    let id = block_id(index);
                    isolate::contain(&id, || self.blocks.render_block(index, block))
                        .unwrap_or_else(|| Node::unavailable(id))
                })
                .collect();
            Ok(Node::Document {
                title: sanitize(&document.general_title),
                children,
            })
        });
        tree.unwrap_or_else(|| Node::unavailable("document"))
    }

    /// Renders the document and resolves every diagram.
    pub async fn render(&self, document: &Document) -> Node {
        let mut tree = self.render_tree(document);
        if let Node::Document { children, .. } = &mut tree {
            self.resolve_diagrams(children).await;
        }
        tree
    }

    /// Like [`DocumentRenderer::render`], plus a handle that tears the render down. Diagrams
    /// still pending at that point end up [`DiagramView::Cancelled`].
    pub fn render_cancellable<'a>(
        &'a self,
        document: &'a Document,
    ) -> (impl Future<Output = Node> + 'a, AbortHandle) {
        let (handle, registration) = AbortHandle::new_pair();
        let render = async move {
            let mut tree = self.render_tree(document);
            if let Node::Document { children, .. } = &mut tree {
                let resolved = Abortable::new(self.resolve_diagrams(children), registration).await;
                if resolved.is_err() {
                    tracing::debug!("document render cancelled");
                    for child in children.iter_mut() {
                        if child.pending_diagram_source().is_some() {
                            child.set_diagram_view(DiagramView::Cancelled);
                        }
                    }
                }
            }
            tree
        };
        (render, handle)
    }

    async fn resolve_diagrams(&self, children: &mut [Node]) {
        let prefix = &self.diagrams.options().id_prefix;
        let jobs = children
            .iter_mut()
            .enumerate()
            .filter(|(_, node)| node.pending_diagram_source().is_some())
            .map(|(index, node)| self.resolve_one(format!("{prefix}-{index}"), node));
        join_all(jobs).await;
    }

    async fn resolve_one(&self, base_id: String, node: &mut Node) {
        let Some(source) = node.pending_diagram_source().map(str::to_string) else {
            return;
        };
        let id = node.id().to_string();
        let view = isolate::contain_async(
            &id,
            self.diagrams
                .render_diagram(&base_id, &source)
                .map(Ok::<_, Error>),
        )
        .await;
        match view {
            Some(view) => node.set_diagram_view(view),
            None => *node = Node::unavailable(id),
        }
    }
}
