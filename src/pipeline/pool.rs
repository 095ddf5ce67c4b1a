//! Bounded worker pool shared by the concurrent pipeline phases.
//!
//! All items are queued and the queue is closed before any worker starts.
//! Workers pull until the queue is drained, and every per-item result is sent
//! to a single collector, so no result state is shared between workers.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Aggregated per-item results of one pool run.
#[derive(Debug)]
pub struct PoolReport<R, E> {
    pub succeeded: Vec<R>,
    pub failed: Vec<E>,
    /// Items left in the queue because the run was cancelled.
    pub abandoned: usize,
}

impl<R, E> Default for PoolReport<R, E> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            abandoned: 0,
        }
    }
}

impl<R, E> PoolReport<R, E> {
    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Drains a result channel into a report.
pub async fn collect<R, E>(mut results: mpsc::UnboundedReceiver<Result<R, E>>) -> PoolReport<R, E> {
    let mut report = PoolReport::default();
    while let Some(result) = results.recv().await {
        match result {
            Ok(value) => report.succeeded.push(value),
            Err(err) => report.failed.push(err),
        }
    }
    report
}

/// Runs `op` over `items` with at most `workers` items in flight.
///
/// `op` receives the worker index and the item. Workers stop taking new items
/// once `cancel` fires; items still queued are counted as abandoned.
pub async fn run<T, R, E, F, Fut>(
    items: Vec<T>,
    workers: usize,
    cancel: &CancellationToken,
    op: F,
) -> PoolReport<R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    if items.is_empty() {
        return PoolReport::default();
    }

    let total = items.len();
    let (queue_tx, queue_rx) = mpsc::channel(total);
    for item in items {
        // Capacity equals the item count, so this never fails.
        let _ = queue_tx.try_send(item);
    }
    drop(queue_tx);

    let queue = Arc::new(Mutex::new(queue_rx));
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let op = Arc::new(op);
    let mut set = JoinSet::new();

    for worker_id in 0..workers.clamp(1, total) {
        let queue = Arc::clone(&queue);
        let results_tx = results_tx.clone();
        let op = Arc::clone(&op);
        let cancel = cancel.clone();

        set.spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let next = queue.lock().await.recv().await;
                let Some(item) = next else {
                    break;
                };
                let result = op(worker_id, item).await;
                if results_tx.send(result).is_err() {
                    break;
                }
            }
        });
    }
    drop(results_tx);

    let mut report = collect(results_rx).await;

    while let Some(joined) = set.join_next().await {
        if let Err(err) = joined {
            error!("Pool worker terminated abnormally: {}", err);
        }
    }

    report.abandoned = total.saturating_sub(report.processed());
    report
}
