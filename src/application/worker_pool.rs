//! Bounded worker pool
//!
//! Runs one task per item with at most `workers` in flight. A task that
//! panics is reported as a failure for its own item; siblings keep running.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskFailure {
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task did not complete: {0}")]
    Aborted(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Run `task` over `items` with bounded concurrency.
///
/// Results come back in input order.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, workers: usize, task: F) -> Vec<Result<R, TaskFailure>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let task = Arc::new(task);
    let mut join_set = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let task = task.clone();
        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (index, Err(TaskFailure::Aborted("worker pool closed".into())));
            };
            let outcome = AssertUnwindSafe(task(item))
                .catch_unwind()
                .await
                .map_err(|payload| TaskFailure::Panicked(panic_message(payload.as_ref())));
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<Result<R, TaskFailure>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, outcome)) => {
                if let Err(failure) = &outcome {
                    error!("Worker task {} failed: {}", index, failure);
                }
                slots[index] = Some(outcome);
            }
            Err(e) => error!("Worker task was cancelled: {}", e),
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(TaskFailure::Aborted("task was cancelled".into()))))
        .collect()
}
