//! Bounded-concurrency task launcher.
//!
//! Tasks launch in submission order and at most `limit` run at once. A
//! failing task never cancels its siblings: [`Batch::wait_all`] returns the
//! first error it sees, but tasks that are already running, and tasks still
//! queued behind the limit, keep going in the background. Callers must expect
//! side effects from those tasks after `wait_all` has returned an error.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tracing::trace;

use crate::TransferError;

/// Launches tasks with at most `limit` outstanding at any instant.
#[derive(Debug, Clone)]
pub struct Throttle {
    limit: usize,
    permits: Arc<Semaphore>,
}

impl Throttle {
    /// Creates a throttle. `limit` must be at least 1.
    pub fn new(limit: usize) -> Result<Self, TransferError> {
        if limit == 0 {
            return Err(TransferError::InvalidLimit);
        }
        Ok(Self {
            limit,
            permits: Arc::new(Semaphore::new(limit)),
        })
    }

    /// Maximum number of concurrently outstanding tasks.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Launches every factory in order, each once a slot is free.
    ///
    /// A factory is called when its task launches; the future it returns is
    /// spawned and holds the slot until it settles. Must be called from
    /// within a tokio runtime.
    pub fn launch<F, Fut, T, E>(&self, factories: Vec<F>) -> Batch<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let expected = factories.len();
        let (tx, rx) = mpsc::unbounded_channel();
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            for (index, factory) in factories.into_iter().enumerate() {
                // The semaphore is never closed.
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                trace!(index, "launching throttled task");
                let task = factory();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result = task.await;
                    drop(permit);
                    // The receiver is gone once the caller saw a failure.
                    let _ = tx.send(result);
                });
            }
        });

        Batch { rx, expected }
    }
}

/// Handle to the results of one [`Throttle::launch`] call.
pub struct Batch<T, E> {
    rx: mpsc::UnboundedReceiver<Result<T, E>>,
    expected: usize,
}

impl<T, E> Batch<T, E> {
    /// Waits until every task succeeded, or returns the first failure.
    ///
    /// Successful results come back in completion order.
    ///
    /// # Panics
    ///
    /// Panics if a task panicked, since its result can never arrive.
    pub async fn wait_all(mut self) -> Result<Vec<T>, E> {
        let mut results = Vec::with_capacity(self.expected);
        while let Some(result) = self.rx.recv().await {
            results.push(result?);
        }
        assert_eq!(
            results.len(),
            self.expected,
            "throttled task ended without a result"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Factory = Box<
        dyn FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<usize, String>> + Send>>
            + Send,
    >;

    #[test]
    fn zero_limit_rejected() {
        assert!(matches!(Throttle::new(0), Err(TransferError::InvalidLimit)));
    }

    #[tokio::test]
    async fn never_exceeds_limit_and_runs_all() {
        let throttle = Throttle::new(3).unwrap();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let factories: Vec<_> = (0..20usize)
            .map(|i| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                let runs = Arc::clone(&runs);
                move || async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1 + (i % 4) as u64)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(i)
                }
            })
            .collect();

        let mut results = throttle.launch(factories).wait_all().await.unwrap();
        results.sort_unstable();

        assert_eq!(results, (0..20).collect::<Vec<_>>());
        assert_eq!(runs.load(Ordering::SeqCst), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn launches_in_submission_order() {
        let throttle = Throttle::new(2).unwrap();
        let launched = Arc::new(Mutex::new(Vec::new()));

        let factories: Vec<_> = (0..8usize)
            .map(|i| {
                let launched = Arc::clone(&launched);
                move || {
                    launched.lock().unwrap().push(i);
                    async move {
                        // Later tasks finish first.
                        tokio::time::sleep(Duration::from_millis(10 - i as u64)).await;
                        Ok::<_, String>(i)
                    }
                }
            })
            .collect();

        throttle.launch(factories).wait_all().await.unwrap();
        assert_eq!(*launched.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failure_reported_without_cancelling_siblings() {
        let throttle = Throttle::new(2).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));

        let mut factories: Vec<Factory> = Vec::new();
        factories.push(Box::new(|| Box::pin(async { Err("part 1 failed".to_string()) })));
        for i in 1..4usize {
            let finished = Arc::clone(&finished);
            factories.push(Box::new(move || {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(i)
                })
            }));
        }

        let err = throttle.launch(factories).wait_all().await.unwrap_err();
        assert_eq!(err, "part 1 failed");
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        // Background tasks keep running after the caller observed the failure.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert_eq!(throttle.in_flight(), 0);
    }

    #[tokio::test]
    async fn empty_batch_completes() {
        let throttle = Throttle::new(1).unwrap();
        let results = throttle
            .launch(Vec::<Factory>::new())
            .wait_all()
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
