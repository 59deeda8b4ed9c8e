//! Bounded task pool with per-task failure isolation.
//!
//! [`run_bounded`] drives a list of labeled units of work with a concurrency
//! ceiling. `min(limit, tasks.len())` workers share a single cursor over the
//! task list; each worker claims the next index, runs the work to completion,
//! and records the settled outcome for that index. Workers are cooperatively
//! scheduled on the caller's task, so suspension only happens inside the work
//! itself.
//!
//! A failing (or panicking) task is captured as [`Settled::Rejected`] and
//! logged with its label; siblings are never cancelled. The returned vector
//! always has one entry per task, in input order.
//!
//! # Example
//!
//! ```
//! use course_forge::scheduler::{run_bounded, Task};
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let tasks = vec![
//!     Task::new("answer", async { Ok(42) }),
//!     Task::new("fails", async { Err(anyhow::anyhow!("boom")) }),
//! ];
//! let results = run_bounded(tasks, 2).await.unwrap();
//! assert!(results[0].is_fulfilled());
//! assert!(results[1].is_rejected());
//! # });
//! ```

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error};

/// Errors that can occur when starting the pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The concurrency limit must be at least 1.
    #[error("Invalid concurrency limit: {0} (must be at least 1)")]
    InvalidLimit(usize),
}

/// A labeled unit of work.
///
/// The label is used for logging and correlation only; two tasks with the
/// same label are still run independently.
pub struct Task<'a, T> {
    label: String,
    work: BoxFuture<'a, anyhow::Result<T>>,
}

impl<'a, T> Task<'a, T> {
    /// Creates a task from a label and a future producing its result.
    pub fn new<F>(label: impl Into<String>, work: F) -> Self
    where
        F: std::future::Future<Output = anyhow::Result<T>> + Send + 'a,
    {
        Self {
            label: label.into(),
            work: work.boxed(),
        }
    }

    /// Returns the task label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> fmt::Debug for Task<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish()
    }
}

/// Outcome of one task.
#[derive(Debug)]
pub enum Settled<T> {
    Fulfilled(T),
    Rejected(anyhow::Error),
}

impl<T> Settled<T> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Settled::Rejected(_))
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> anyhow::Result<T> {
        match self {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(err) => Err(err),
        }
    }

    /// Returns the fulfilled value, discarding a rejection.
    pub fn ok(self) -> Option<T> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }
}

/// Runs `tasks` with at most `limit` in flight and returns their outcomes in
/// input order.
///
/// # Errors
///
/// Returns [`PoolError::InvalidLimit`] when `limit` is zero. Task failures are
/// never returned as errors; they are reported as [`Settled::Rejected`].
pub async fn run_bounded<T>(tasks: Vec<Task<'_, T>>, limit: usize) -> Result<Vec<Settled<T>>, PoolError> {
    if limit == 0 {
        return Err(PoolError::InvalidLimit(limit));
    }
    let total = tasks.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let cursor = Mutex::new(tasks.into_iter().enumerate());
    let workers = (0..limit.min(total)).map(|worker_id| worker_loop(worker_id, &cursor));
    let finished = join_all(workers).await;

    let mut slots: Vec<Option<Settled<T>>> = (0..total).map(|_| None).collect();
    for (index, outcome) in finished.into_iter().flatten() {
        slots[index] = Some(outcome);
    }

    Ok(slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| Settled::Rejected(anyhow::anyhow!("task was never scheduled")))
        })
        .collect())
}

type Cursor<'a, T> = Mutex<std::iter::Enumerate<std::vec::IntoIter<Task<'a, T>>>>;

async fn worker_loop<T>(worker_id: usize, cursor: &Cursor<'_, T>) -> Vec<(usize, Settled<T>)> {
    let mut settled = Vec::new();

    loop {
        let claimed = match cursor.lock() {
            Ok(mut guard) => guard.next(),
            Err(poisoned) => poisoned.into_inner().next(),
        };
        let Some((index, task)) = claimed else {
            break;
        };

        let Task { label, work } = task;
        debug!(worker_id, index, label = %label, "Task started");
        let started = Instant::now();

        let outcome = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(value)) => {
                debug!(
                    worker_id,
                    label = %label,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Task fulfilled"
                );
                Settled::Fulfilled(value)
            }
            Ok(Err(err)) => {
                error!(worker_id, label = %label, error = %format!("{:#}", err), "Task rejected");
                Settled::Rejected(err)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(worker_id, label = %label, panic = %message, "Task panicked");
                Settled::Rejected(anyhow::anyhow!("task '{}' panicked: {}", label, message))
            }
        };
        settled.push((index, outcome));
    }

    settled
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn sleepy(label: String, ms: u64, value: usize) -> Task<'static, usize> {
        Task::new(label, async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(value)
        })
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let results = run_bounded::<usize>(Vec::new(), 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_is_rejected() {
        let tasks = vec![sleepy("a".into(), 1, 1)];
        assert_eq!(
            run_bounded(tasks, 0).await.unwrap_err(),
            PoolError::InvalidLimit(0)
        );
    }

    #[tokio::test]
    async fn test_results_preserve_input_order() {
        for limit in 1..=5 {
            let tasks: Vec<_> = (0..5)
                .map(|i| sleepy(format!("t{}", i), (5 - i as u64) * 3, i))
                .collect();
            let results = run_bounded(tasks, limit).await.unwrap();
            let values: Vec<usize> = results.into_iter().filter_map(Settled::ok).collect();
            assert_eq!(values, vec![0, 1, 2, 3, 4], "limit {}", limit);
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated_regardless_of_position() {
        let n = 6;
        for failing in 0..n {
            let tasks: Vec<Task<'static, usize>> = (0..n)
                .map(|i| {
                    Task::new(format!("t{}", i), async move {
                        tokio::task::yield_now().await;
                        if i == failing {
                            anyhow::bail!("task {} failed", i);
                        }
                        Ok(i)
                    })
                })
                .collect();
            let results = run_bounded(tasks, 2).await.unwrap();
            assert_eq!(results.len(), n);
            for (i, result) in results.iter().enumerate() {
                assert_eq!(result.is_rejected(), i == failing);
            }
        }
    }

    fn explode() -> anyhow::Result<usize> {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let tasks: Vec<Task<'static, usize>> = vec![
            Task::new("ok", async { Ok(1) }),
            Task::new("panics", async { explode() }),
            Task::new("ok-too", async { Ok(3) }),
        ];
        let results = run_bounded(tasks, 3).await.unwrap();
        assert!(results[0].is_fulfilled());
        assert!(results[2].is_fulfilled());
        match &results[1] {
            Settled::Rejected(err) => assert!(err.to_string().contains("kaboom")),
            Settled::Fulfilled(_) => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<Task<'static, ()>> = (0..10)
            .map(|i| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                Task::new(format!("t{}", i), async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        let results = run_bounded(tasks, 3).await.unwrap();
        assert_eq!(results.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_limit_above_task_count() {
        let tasks: Vec<_> = (0..3).map(|i| sleepy(format!("t{}", i), 1, i)).collect();
        let results = run_bounded(tasks, 50).await.unwrap();
        assert!(results.iter().all(Settled::is_fulfilled));
    }

    #[tokio::test]
    async fn test_borrowing_tasks() {
        let shared = vec![10usize, 20, 30];
        let tasks: Vec<Task<'_, usize>> = shared
            .iter()
            .map(|v| Task::new(format!("v{}", v), async move { Ok(*v + 1) }))
            .collect();
        let values: Vec<usize> = run_bounded(tasks, 2)
            .await
            .unwrap()
            .into_iter()
            .filter_map(Settled::ok)
            .collect();
        assert_eq!(values, vec![11, 21, 31]);
    }
}
