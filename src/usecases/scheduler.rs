//! Probe Scheduler - Bounded Worker Pool
//!
//! Runs a batch of probes on a fixed number of spawned worker tasks
//! that pull from one shared queue, then waits for every worker to
//! drain it. The call is a barrier: it returns only once each item has
//! been handled exactly once. A panicking item is logged and counted;
//! its worker moves on to the next item.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Worker count used when none (or a non-positive one) is configured.
pub const DEFAULT_WORKERS: usize = 3;

/// Resolve a configured worker count, falling back to [`DEFAULT_WORKERS`].
pub fn effective_workers(configured: i64) -> usize {
    usize::try_from(configured)
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_WORKERS)
}

/// Fixed-size pool executing one batch at a time.
#[derive(Debug, Clone, Copy)]
pub struct ProbeScheduler {
    workers: usize,
}

impl ProbeScheduler {
    /// Create a scheduler with `workers` parallel workers (0 means default).
    pub const fn new(workers: usize) -> Self {
        let workers = if workers == 0 { DEFAULT_WORKERS } else { workers };
        Self { workers }
    }

    /// Configured worker bound.
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task` once for every item and wait for all of them.
    ///
    /// Results come back in completion order. Never spawns more workers
    /// than there are items. Dropping the returned future aborts the
    /// whole batch.
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, task: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = self.workers.min(total);
        let (queue_tx, queue_rx) = mpsc::channel::<T>(workers);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<R>();
        let task = Arc::new(task);

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let queue_rx = Arc::clone(&queue_rx);
            let done_tx = done_tx.clone();
            let task = Arc::clone(&task);

            pool.spawn(async move {
                let mut panicked = 0usize;
                loop {
                    let next = queue_rx.lock().await.recv().await;
                    let Some(item) = next else { break };

                    // A panicking item only fails its own task.
                    let mut running = JoinSet::new();
                    running.spawn((*task)(item));
                    match running.join_next().await {
                        Some(Ok(result)) => {
                            if done_tx.send(result).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            panicked += 1;
                            error!(error = %e, "Probe task terminated abnormally");
                        }
                        None => {}
                    }
                }
                panicked
            });
        }
        drop(done_tx);
        drop(queue_rx);

        for item in items {
            // Fails only once every worker has died.
            if queue_tx.send(item).await.is_err() {
                break;
            }
        }
        drop(queue_tx);

        let mut panicked = 0usize;
        let mut failed_workers = 0usize;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(count) => panicked += count,
                Err(e) => {
                    failed_workers += 1;
                    error!(error = %e, "Probe worker terminated abnormally");
                }
            }
        }

        let mut results = Vec::with_capacity(total);
        while let Some(result) = done_rx.recv().await {
            results.push(result);
        }

        debug!(
            total,
            workers,
            completed = results.len(),
            panicked,
            failed_workers,
            "Probe batch finished"
        );
        results
    }
}

impl Default for ProbeScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_effective_workers_defaults() {
        assert_eq!(effective_workers(0), 3);
        assert_eq!(effective_workers(-4), 3);
        assert_eq!(effective_workers(7), 7);
        assert_eq!(ProbeScheduler::new(0).workers(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let results: Vec<u32> = ProbeScheduler::new(2)
            .run_all(Vec::<u32>::new(), |n| async move { n })
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_every_item_once_for_all_worker_bounds() {
        for workers in 1..=8 {
            let mut results = ProbeScheduler::new(workers)
                .run_all((0..8u32).collect(), |n| async move {
                    tokio::time::sleep(Duration::from_millis(u64::from(n % 3))).await;
                    n
                })
                .await;
            results.sort_unstable();
            assert_eq!(results, (0..8).collect::<Vec<_>>(), "workers={workers}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_bound() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        ProbeScheduler::new(3)
            .run_all((0..20).collect::<Vec<u32>>(), move |_| {
                let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_panicking_item_does_not_abort_batch() {
        let mut results = ProbeScheduler::new(2)
            .run_all((0..6u32).collect(), |n| async move {
                assert!(n != 3, "boom");
                n
            })
            .await;
        results.sort_unstable();
        assert_eq!(results, vec![0, 1, 2, 4, 5]);
    }

    #[tokio::test]
    async fn test_single_worker_survives_panics() {
        let mut results = ProbeScheduler::new(1)
            .run_all((0..6u32).collect(), |n| async move {
                assert!(n != 1 && n != 4, "boom");
                n
            })
            .await;
        results.sort_unstable();
        assert_eq!(results, vec![0, 2, 3, 5]);
    }
}
