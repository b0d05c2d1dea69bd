//! Diagram rendering with progressively simplified sources.
//!
//! Strategies are tried one at a time, never concurrently: attempt `i` renders the original
//! source with transforms `1..=i` applied. Each attempt gets a fresh id and a bounded wait; a
//! timeout counts as a failure.

use crate::model::DiagramView;
use crate::{EngineError, RenderOptions};
use futures::future::{AbortHandle, BoxFuture, abortable};
use lectio_core::KeywordRegistry;
use lectio_core::diagram::{add_space_after_keyword, strip_label_quotes, truncate_labels};
use serde::Serialize;
use std::future::Future;
use uuid::Uuid;

/// The diagram engine collaborator, called once per attempt.
pub trait DiagramEngine {
    /// Renders `source` into graphical markup. `id` is unique per attempt.
    fn attempt_render<'a>(
        &'a self,
        id: &'a str,
        source: &'a str,
    ) -> BoxFuture<'a, std::result::Result<String, EngineError>>;
}

impl<E: DiagramEngine + ?Sized> DiagramEngine for std::sync::Arc<E> {
    fn attempt_render<'a>(
        &'a self,
        id: &'a str,
        source: &'a str,
    ) -> BoxFuture<'a, std::result::Result<String, EngineError>> {
        (**self).attempt_render(id, source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Original,
    AddSpaceAfterKeyword,
    StripQuotesFromLabels,
    TruncateLongLabels,
}

pub const STRATEGIES: [Strategy; 4] = [
    Strategy::Original,
    Strategy::AddSpaceAfterKeyword,
    Strategy::StripQuotesFromLabels,
    Strategy::TruncateLongLabels,
];

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::AddSpaceAfterKeyword => "add-space-after-keyword",
            Self::StripQuotesFromLabels => "strip-quotes-from-labels",
            Self::TruncateLongLabels => "truncate-long-labels",
        }
    }

    fn apply(self, source: &str, registry: &KeywordRegistry, label_limit: usize) -> String {
        match self {
            Self::Original => source.to_string(),
            Self::AddSpaceAfterKeyword => ensure_space_after_keyword(source, registry),
            Self::StripQuotesFromLabels => strip_label_quotes(source),
            Self::TruncateLongLabels => truncate_labels(source, label_limit).into_owned(),
        }
    }
}

/// Source text for attempt `index`: the original with strategies `1..=index` applied in order.
pub fn prepare_source(
    source: &str,
    index: usize,
    registry: &KeywordRegistry,
    label_limit: usize,
) -> String {
    STRATEGIES
        .iter()
        .take(index + 1)
        .fold(source.to_string(), |text, strategy| {
            strategy.apply(&text, registry, label_limit)
        })
}

/// Splits a keyword glued to its direction and puts a plain space after a keyword followed by
/// `;` or a tab.
fn ensure_space_after_keyword(source: &str, registry: &KeywordRegistry) -> String {
    let text = add_space_after_keyword(source, registry);
    let Some(m) = registry.match_keyword(&text) else {
        return text;
    };
    let leading = text.len() - text.trim_start().len();
    let split_at = leading + m.keyword.len();
    let rest = &text[split_at..];
    if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\n') {
        return text;
    }
    format!("{} {}", &text[..split_at], rest.trim_start_matches(['\t', '\r']))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RetryState {
    Pending(usize),
    Rendered(usize),
    Failed,
}

impl RetryState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Success,
    Failure,
}

/// Pure transition function of the retry state machine. Terminal states absorb.
pub fn transition(state: RetryState, result: AttemptResult, strategy_count: usize) -> RetryState {
    match (state, result) {
        (RetryState::Pending(i), AttemptResult::Success) => RetryState::Rendered(i),
        (RetryState::Pending(i), AttemptResult::Failure) if i + 1 < strategy_count => {
            RetryState::Pending(i + 1)
        }
        (RetryState::Pending(_), AttemptResult::Failure) => RetryState::Failed,
        (terminal, _) => terminal,
    }
}

/// First `max_chars` characters of `source`, marked with `...` when cut.
pub fn excerpt(source: &str, max_chars: usize) -> String {
    let source = source.trim();
    if source.chars().count() <= max_chars {
        return source.to_string();
    }
    let prefix: String = source.chars().take(max_chars).collect();
    format!("{}...", prefix.trim_end())
}

fn attempt_id(base_id: &str) -> String {
    format!("{base_id}-{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone)]
pub struct RetryEngine<E> {
    engine: E,
    options: RenderOptions,
    registry: KeywordRegistry,
}

impl<E: DiagramEngine> RetryEngine<E> {
    pub fn new(engine: E, options: RenderOptions) -> Self {
        Self {
            engine,
            options,
            registry: KeywordRegistry::default(),
        }
    }

    pub fn with_registry(mut self, registry: KeywordRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Runs the strategy list against the engine until one attempt succeeds. Never fails:
    /// exhaustion yields [`DiagramView::Failed`] with an excerpt of `source`.
    ///
    /// `base_id` prefixes every attempt id; a fresh `uuid` suffix keeps them unique.
    pub async fn render_diagram(&self, base_id: &str, source: &str) -> DiagramView {
        let count = STRATEGIES.len();
        let mut state = RetryState::Pending(0);

        while let RetryState::Pending(index) = state {
            let strategy = STRATEGIES[index];
            let candidate =
                prepare_source(source, index, &self.registry, self.options.retry_label_limit);
            let id = attempt_id(base_id);

            let outcome = match tokio::time::timeout(
                self.options.attempt_timeout,
                self.engine.attempt_render(&id, &candidate),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout {
                    elapsed_ms: self.options.attempt_timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(markup) => {
                    state = transition(state, AttemptResult::Success, count);
                    tracing::debug!(
                        id = %id,
                        strategy = strategy.as_str(),
                        ?state,
                        "diagram rendered"
                    );
                    return DiagramView::Rendered {
                        strategy,
                        attempt: index + 1,
                        render_id: id,
                        markup,
                    };
                }
                Err(err) => {
                    state = transition(state, AttemptResult::Failure, count);
                    tracing::debug!(
                        id = %id,
                        strategy = strategy.as_str(),
                        %err,
                        ?state,
                        "diagram attempt failed"
                    );
                }
            }
        }

        tracing::warn!(
            base_id,
            attempts = count,
            "diagram could not be rendered with any strategy"
        );
        DiagramView::Failed {
            excerpt: excerpt(source, self.options.excerpt_chars),
            attempts: count,
        }
    }

    /// Like [`RetryEngine::render_diagram`], plus a handle that abandons the render. An aborted
    /// render resolves to [`DiagramView::Cancelled`]; output of an in-flight attempt is dropped.
    pub fn render_diagram_cancellable<'a>(
        &'a self,
        base_id: &'a str,
        source: &'a str,
    ) -> (impl Future<Output = DiagramView> + 'a, AbortHandle) {
        let (render, handle) = abortable(self.render_diagram(base_id, source));
        let view = async move {
            render.await.unwrap_or_else(|_| {
                tracing::debug!(base_id, "diagram render cancelled");
                DiagramView::Cancelled
            })
        };
        (view, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fails on any source not accepted by `accept`, recording every call.
    struct FakeEngine<F> {
        accept: F,
        delay: Duration,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl<F: Fn(&str) -> bool + Send + Sync> FakeEngine<F> {
        fn new(accept: F) -> Self {
            Self {
                accept,
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl<F: Fn(&str) -> bool + Send + Sync> DiagramEngine for FakeEngine<F> {
        fn attempt_render<'a>(
            &'a self,
            id: &'a str,
            source: &'a str,
        ) -> BoxFuture<'a, std::result::Result<String, EngineError>> {
            async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push((id.to_string(), source.to_string()));
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                if (self.accept)(source) {
                    Ok(format!("<svg>{source}</svg>"))
                } else {
                    Err(EngineError::syntax("parse error"))
                }
            }
            .boxed()
        }
    }

    fn retry<E: DiagramEngine>(engine: E) -> RetryEngine<E> {
        RetryEngine::new(engine, RenderOptions::default())
    }

    #[test]
    fn transition_walks_the_strategy_list() {
        let s = RetryState::Pending(0);
        assert_eq!(transition(s, AttemptResult::Failure, 4), RetryState::Pending(1));
        assert_eq!(transition(s, AttemptResult::Success, 4), RetryState::Rendered(0));
        assert_eq!(
            transition(RetryState::Pending(3), AttemptResult::Failure, 4),
            RetryState::Failed
        );
        assert_eq!(
            transition(RetryState::Rendered(2), AttemptResult::Failure, 4),
            RetryState::Rendered(2)
        );
        assert_eq!(
            transition(RetryState::Failed, AttemptResult::Success, 4),
            RetryState::Failed
        );
        assert!(RetryState::Failed.is_terminal());
        assert!(!RetryState::Pending(0).is_terminal());
    }

    #[test]
    fn strategies_are_cumulative() {
        let reg = KeywordRegistry::default();
        let src = "graphTD\nA[\"a very long quoted label for the retry\"] --> B";
        assert_eq!(prepare_source(src, 0, &reg, 24), src);
        assert_eq!(
            prepare_source(src, 1, &reg, 24),
            "graph TD\nA[\"a very long quoted label for the retry\"] --> B"
        );
        assert_eq!(
            prepare_source(src, 2, &reg, 24),
            "graph TD\nA[a very long quoted label for the retry] --> B"
        );
        assert_eq!(
            prepare_source(src, 3, &reg, 24),
            "graph TD\nA[a very long quoted la...] --> B"
        );
    }

    #[test]
    fn keyword_followed_by_semicolon_gets_a_space() {
        let reg = KeywordRegistry::default();
        assert_eq!(ensure_space_after_keyword("graph;A-->B", &reg), "graph ;A-->B");
        assert_eq!(ensure_space_after_keyword("graph TD", &reg), "graph TD");
        assert_eq!(ensure_space_after_keyword("A-->B", &reg), "A-->B");
    }

    #[test]
    fn excerpts_are_prefixes() {
        assert_eq!(excerpt("graph TD", 120), "graph TD");
        assert_eq!(excerpt("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn first_working_strategy_wins() {
        let engine = FakeEngine::new(|s: &str| s.starts_with("graph TD"));
        let retry = retry(engine);
        let view = retry.render_diagram("lectio-0", "graphTD\nA-->B").await;
        let DiagramView::Rendered {
            strategy,
            attempt,
            render_id,
            markup,
        } = view
        else {
            panic!("expected rendered view, got {view:?}");
        };
        assert_eq!(strategy, Strategy::AddSpaceAfterKeyword);
        assert_eq!(attempt, 2);
        assert!(render_id.starts_with("lectio-0-"));
        assert_eq!(markup, "<svg>graph TD\nA-->B</svg>");

        let calls = retry.engine().calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].0, calls[1].0, "attempt ids must be unique");
    }

    #[tokio::test]
    async fn exhaustion_yields_a_placeholder_with_an_excerpt() {
        let source = format!("flowchart LR\n{}", "A-->B\n".repeat(40));
        let retry = retry(FakeEngine::new(|_: &str| false));
        let view = retry.render_diagram("lectio-1", &source).await;
        let DiagramView::Failed { excerpt, attempts } = view else {
            panic!("expected failure, got {view:?}");
        };
        assert_eq!(attempts, 4);
        assert!(excerpt.starts_with("flowchart LR\nA-->B"));
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 123);
        assert_eq!(retry.engine().calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out_and_advance() {
        let mut engine = FakeEngine::new(|_: &str| true);
        engine.delay = Duration::from_secs(11);
        let retry = retry(engine);
        let view = retry.render_diagram("lectio-2", "graph TD").await;
        assert!(matches!(view, DiagramView::Failed { attempts: 4, .. }), "{view:?}");
        assert_eq!(retry.engine().calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_inside_the_window_succeed() {
        let mut engine = FakeEngine::new(|_: &str| true);
        engine.delay = Duration::from_secs(9);
        let view = retry(engine).render_diagram("lectio-3", "graph TD").await;
        assert!(matches!(
            view,
            DiagramView::Rendered {
                strategy: Strategy::Original,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_renders_are_cancelled() {
        let mut engine = FakeEngine::new(|_: &str| true);
        engine.delay = Duration::from_secs(5);
        let retry = retry(engine);
        let (view, handle) = retry.render_diagram_cancellable("lectio-4", "graph TD");
        let abort = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.abort();
        };
        let (view, ()) = futures::join!(view, abort);
        assert_eq!(view, DiagramView::Cancelled);
        assert_eq!(retry.engine().calls().len(), 1);
    }
}
