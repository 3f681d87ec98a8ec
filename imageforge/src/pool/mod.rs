//! Bounded-concurrency task pool.
//!
//! Runs a batch of async tasks with a concurrency ceiling. Tasks are
//! *started* in submission order, but results surface in *completion*
//! order: consumers get full coverage, not index correspondence, and
//! must tag results themselves if they need to match inputs to outputs.
//!
//! The pool keeps its in-flight task handles in a private [`Deque`]: once
//! saturated it awaits `pop_front` of the oldest handle, which releases
//! exactly one concurrency slot per await.
//!
//! # Failure modes
//!
//! Two execution modes exist, deliberately distinct:
//!
//! - [`FailureMode::AbortOnFirst`] ([`run_pool`], [`run_pool_stream`]):
//!   the first task error rejects the whole batch with that error. No
//!   further tasks are launched once the failure is observed; tasks
//!   already in flight run to completion and their results are dropped.
//! - [`FailureMode::SettleAll`] ([`settle_pool`]): every task runs
//!   regardless of other tasks' failures, and the caller receives all
//!   individual outcomes.

use crate::deque::Deque;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Errors from pool execution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError<E> {
    /// The concurrency limit was not a positive integer.
    ///
    /// Detected before any task is started.
    #[error("concurrency must be a positive integer, got {0}")]
    InvalidConcurrency(usize),

    /// A task failed while running under [`FailureMode::AbortOnFirst`].
    #[error("pooled task failed: {0}")]
    Task(E),
}

/// How the pool reacts to a failing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Stop launching tasks after the first observed failure and reject
    /// the whole batch with it.
    AbortOnFirst,
    /// Run every task and report each outcome individually.
    SettleAll,
}

/// Runs `tasks` with at most `concurrency` in flight and collects every
/// result.
///
/// The returned vector is in completion order, not submission order.
/// The first task error rejects the batch with [`PoolError::Task`];
/// a zero concurrency fails with [`PoolError::InvalidConcurrency`]
/// before any task starts.
pub async fn run_pool<T, E, F, Fut>(
    tasks: Vec<F>,
    concurrency: usize,
) -> Result<Vec<T>, PoolError<E>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let expected = tasks.len();
    let mut stream = run_pool_stream(tasks, concurrency)?;

    let mut results = Vec::with_capacity(expected);
    while let Some(result) = stream.next_result().await {
        results.push(result?);
    }
    Ok(results)
}

/// Streaming form of [`run_pool`]: yields each result as soon as its task
/// completes.
///
/// Validation happens synchronously, before any task is started.
pub fn run_pool_stream<T, E, F, Fut>(
    tasks: Vec<F>,
    concurrency: usize,
) -> Result<PoolStream<T, E>, PoolError<E>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    if concurrency == 0 {
        return Err(PoolError::InvalidConcurrency(concurrency));
    }
    let rx = spawn_driver(tasks, concurrency, FailureMode::AbortOnFirst);
    Ok(PoolStream { rx, done: false })
}

/// Runs every task to completion regardless of failures and returns all
/// outcomes in completion order.
pub async fn settle_pool<T, E, F, Fut>(
    tasks: Vec<F>,
    concurrency: usize,
) -> Result<Vec<Result<T, E>>, PoolError<E>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    if concurrency == 0 {
        return Err(PoolError::InvalidConcurrency(concurrency));
    }
    let mut rx = spawn_driver(tasks, concurrency, FailureMode::SettleAll);

    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    Ok(results)
}

/// Spawns the driver task that admits work under the concurrency ceiling.
///
/// Each task sends its outcome over the returned channel the moment it
/// settles, which is what gives consumers completion order. The driver
/// gates admission by awaiting the oldest in-flight handle from its
/// deque once saturated.
fn spawn_driver<T, E, F, Fut>(
    tasks: Vec<F>,
    concurrency: usize,
    mode: FailureMode,
) -> mpsc::UnboundedReceiver<Result<T, E>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let abort = CancellationToken::new();
        let mut in_flight: Deque<JoinHandle<()>> = Deque::new();

        for task in tasks {
            if mode == FailureMode::AbortOnFirst && abort.is_cancelled() {
                break;
            }
            if tx.is_closed() {
                // Consumer went away; nothing left to report to.
                break;
            }

            if in_flight.len() >= concurrency {
                // Await the oldest in-flight task to release one slot.
                // The deque only holds handles the driver pushed, so the
                // must-succeed pop cannot observe an empty deque here.
                match in_flight.pop_front_or_err() {
                    Ok(handle) => {
                        let _ = handle.await;
                    }
                    Err(_) => break,
                }
                // A failure may have been observed while we waited.
                if mode == FailureMode::AbortOnFirst && abort.is_cancelled() {
                    break;
                }
            }

            let tx = tx.clone();
            let abort = abort.clone();
            let handle = tokio::spawn(async move {
                let result = task().await;
                if mode == FailureMode::AbortOnFirst && result.is_err() {
                    abort.cancel();
                }
                // Ignore error if the receiver dropped.
                let _ = tx.send(result);
            });
            in_flight.push_back(handle);
        }

        // Let the stragglers finish before the channel closes.
        while let Some(handle) = in_flight.pop_front() {
            let _ = handle.await;
        }
        trace!("pool driver finished");
    });

    rx
}

/// Stream of pool results in completion order.
///
/// Ends after yielding the first error: the driver stops launching and
/// later completions are discarded.
pub struct PoolStream<T, E> {
    rx: mpsc::UnboundedReceiver<Result<T, E>>,
    done: bool,
}

impl<T, E> PoolStream<T, E> {
    /// Awaits the next settled result, or `None` once the pool is drained
    /// or a failure was already yielded.
    pub async fn next_result(&mut self) -> Option<Result<T, PoolError<E>>> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(Ok(value)) => Some(Ok(value)),
            Some(Err(error)) => {
                self.done = true;
                self.rx.close();
                Some(Err(PoolError::Task(error)))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl<T, E> Stream for PoolStream<T, E> {
    type Item = Result<T, PoolError<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Err(error))) => {
                this.done = true;
                this.rx.close();
                Poll::Ready(Some(Err(PoolError::Task(error))))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Tracks concurrently-active task count and the peak observed.
    struct ConcurrencyProbe {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ConcurrencyProbe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn enter(&self) {
            let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            let mut peak = self.peak.load(Ordering::SeqCst);
            while current > peak {
                match self.peak.compare_exchange_weak(
                    peak,
                    current,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => break,
                    Err(p) => peak = p,
                }
            }
        }

        fn exit(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn zero_concurrency_fails_before_any_task_runs() {
        let started = Arc::new(AtomicUsize::new(0));
        let started_clone = Arc::clone(&started);
        let tasks = vec![move || {
            let started = started_clone;
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, String>(1)
            }
        }];

        let result = run_pool(tasks, 0).await;
        assert_eq!(result, Err(PoolError::InvalidConcurrency(0)));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_concurrency_fails_for_settle_and_stream_forms() {
        let make_tasks = || {
            vec![|| async { Ok::<u32, String>(1) }]
        };

        assert!(matches!(
            settle_pool(make_tasks(), 0).await,
            Err(PoolError::InvalidConcurrency(0))
        ));
        assert!(matches!(
            run_pool_stream(make_tasks(), 0),
            Err(PoolError::InvalidConcurrency(0))
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Completeness and ordering
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn yields_every_result_for_any_concurrency() {
        for concurrency in 1..=8 {
            let tasks: Vec<_> = (0..8u32)
                .map(|i| move || async move { Ok::<u32, String>(i) })
                .collect();

            let results = run_pool(tasks, concurrency).await.unwrap();
            let observed: HashSet<u32> = results.into_iter().collect();
            let expected: HashSet<u32> = (0..8).collect();
            assert_eq!(observed, expected, "concurrency {}", concurrency);
        }
    }

    #[tokio::test]
    async fn results_surface_in_completion_order() {
        // Task 0 sleeps longest, task 2 shortest; with full concurrency
        // the completion order inverts the submission order.
        let tasks: Vec<_> = (0..3u64)
            .map(|i| {
                move || async move {
                    tokio::time::sleep(Duration::from_millis(60 - 20 * i)).await;
                    Ok::<u64, String>(i)
                }
            })
            .collect();

        let results = run_pool(tasks, 3).await.unwrap();
        assert_eq!(results, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn stream_yields_results_as_they_complete() {
        let tasks: Vec<_> = (0..4u32)
            .map(|i| {
                move || async move {
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(i))).await;
                    Ok::<u32, String>(i)
                }
            })
            .collect();

        let mut stream = run_pool_stream(tasks, 4).unwrap();
        let mut seen = Vec::new();
        while let Some(result) = stream.next_result().await {
            seen.push(result.unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn stream_trait_collects_all_results() {
        use futures::StreamExt;

        let tasks: Vec<_> = (0..4u32)
            .map(|i| move || async move { Ok::<u32, String>(i * 10) })
            .collect();

        let stream = run_pool_stream(tasks, 2).unwrap();
        let results: Vec<_> = stream.collect().await;

        let observed: HashSet<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        let expected: HashSet<u32> = (0..4).map(|i| i * 10).collect();
        assert_eq!(observed, expected);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Concurrency ceiling
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn peak_concurrency_never_exceeds_limit() {
        for concurrency in [1usize, 2, 3, 5] {
            let probe = ConcurrencyProbe::new();
            let tasks: Vec<_> = (0..12u32)
                .map(|i| {
                    let probe = Arc::clone(&probe);
                    move || async move {
                        probe.enter();
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        probe.exit();
                        Ok::<u32, String>(i)
                    }
                })
                .collect();

            let results = run_pool(tasks, concurrency).await.unwrap();
            assert_eq!(results.len(), 12);
            assert!(
                probe.peak() <= concurrency,
                "peak {} exceeded limit {}",
                probe.peak(),
                concurrency
            );
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Failure propagation
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_failure_rejects_the_batch() {
        let tasks: Vec<_> = (0..5u32)
            .map(|i| {
                move || async move {
                    if i == 2 {
                        Err(format!("task {} exploded", i))
                    } else {
                        Ok(i)
                    }
                }
            })
            .collect();

        let result = run_pool(tasks, 2).await;
        assert_eq!(result, Err(PoolError::Task("task 2 exploded".to_string())));
    }

    #[tokio::test]
    async fn no_task_launches_after_a_failure_is_observed() {
        // With concurrency 1 the driver observes the failure while
        // awaiting the first handle, before admitting anything else.
        let started = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..5u32)
            .map(|_| {
                let started = Arc::clone(&started);
                move || async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, String>("boom".to_string())
                }
            })
            .collect();

        let result = run_pool(tasks, 1).await;
        assert!(matches!(result, Err(PoolError::Task(_))));

        // Allow any stray launches to surface before asserting.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_ends_after_yielding_the_failure() {
        let tasks: Vec<_> = (0..3u32)
            .map(|i| {
                move || async move {
                    if i == 0 {
                        Err::<u32, String>("boom".to_string())
                    } else {
                        Ok(i)
                    }
                }
            })
            .collect();

        let mut stream = run_pool_stream(tasks, 1).unwrap();
        let first = stream.next_result().await;
        assert!(matches!(first, Some(Err(PoolError::Task(_)))));
        assert!(stream.next_result().await.is_none());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settle-all mode
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn settle_all_runs_every_task_despite_failures() {
        let ran = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..6u32)
            .map(|i| {
                let ran = Arc::clone(&ran);
                move || async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    if i % 2 == 0 {
                        Err(format!("task {} failed", i))
                    } else {
                        Ok(i)
                    }
                }
            })
            .collect();

        let results = settle_pool(tasks, 2).await.unwrap();
        assert_eq!(results.len(), 6);
        assert_eq!(ran.load(Ordering::SeqCst), 6);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 3);
    }
}
