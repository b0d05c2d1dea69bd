//! Fault containment for rendering. A fault (an `Err` or a panic) inside a boundary is logged
//! and reported as `None`; callers substitute [`crate::model::Node::Unavailable`]. Nothing is
//! retried here.

use crate::Result;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs `f`, containing errors and panics.
pub fn contain<T>(scope: &str, f: impl FnOnce() -> Result<T>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            tracing::warn!(scope, %err, "render fault contained");
            None
        }
        Err(payload) => {
            tracing::error!(
                scope,
                panic = %panic_message(payload.as_ref()),
                "render panic contained"
            );
            None
        }
    }
}

/// Async counterpart of [`contain`].
pub async fn contain_async<T, F>(scope: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            tracing::warn!(scope, %err, "render fault contained");
            None
        }
        Err(payload) => {
            tracing::error!(
                scope,
                panic = %panic_message(payload.as_ref()),
                "render panic contained"
            );
            None
        }
    }
}
