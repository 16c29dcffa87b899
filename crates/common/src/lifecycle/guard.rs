//! Panic isolation for independently scheduled tasks.
//!
//! Every background unit of work (reconnect loop, close watcher, warm-up) and
//! every public entry point that runs caller-visible logic is wrapped here so
//! that a panic becomes a logged [`CommonError::TaskPanicked`] rather than an
//! aborted runtime worker or a poisoned caller.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::error;

use crate::error::{CommonError, CommonResult};

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `future` to completion, converting a panic into an error.
///
/// The future is polled in place on the current task, so borrowed state is
/// allowed. Callers must not rely on invariants of values the future was
/// mutating when it panicked.
pub async fn catch_panic<F, T>(task: &str, future: F) -> CommonResult<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(task, panic = %message, "Task panicked; contained at task boundary");
            Err(CommonError::task_panicked(task, message))
        }
    }
}

/// Spawn `future` on the tokio runtime behind a panic boundary.
///
/// The returned handle always completes with `()`; a panic is logged with the
/// task name and swallowed.
pub fn spawn_guarded<F>(task: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let _ = catch_panic(task, future).await;
    })
}
