//! Bounded task pool
//!
//! Long-lived activities (layer readers, forwarders, session loops, retry
//! timers) run on a shared bounded pool. When the pool is saturated the
//! caller either falls back to a detached task (for work that must run) or
//! drops the submission (for best-effort dispatch).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Shared bounded executor built on the tokio runtime.
#[derive(Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl TaskPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Spawn a task, falling back to a detached task when the pool is full.
    ///
    /// The work always runs; saturation is logged so operators can size the
    /// pool above peak concurrency.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                tokio::spawn(async move {
                    fut.await;
                    drop(permit);
                });
            }
            Err(_) => {
                tracing::warn!(pool_size = self.size, "task pool full, running detached");
                tokio::spawn(fut);
            }
        }
    }

    /// Spawn a task only if a pool slot is free.
    ///
    /// Returns false (and drops the work) on saturation. Used for best-effort
    /// dispatch such as audio tap callbacks.
    pub fn try_spawn<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                tokio::spawn(async move {
                    fut.await;
                    drop(permit);
                });
                true
            }
            Err(_) => false,
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_spawn_runs_work() {
        let pool = TaskPool::new(2);
        let (tx, rx) = oneshot::channel();
        pool.spawn(async move {
            let _ = tx.send(42);
        });
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_try_spawn_drops_on_saturation() {
        let pool = TaskPool::new(1);
        let (hold_tx, hold_rx) = oneshot::channel::<()>();
        assert!(pool.try_spawn(async move {
            let _ = hold_rx.await;
        }));

        // Pool has a single slot and it is occupied.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!pool.try_spawn(async {}));

        drop(hold_tx);
    }

    #[tokio::test]
    async fn test_spawn_detaches_on_saturation() {
        let pool = TaskPool::new(1);
        let (hold_tx, hold_rx) = oneshot::channel::<()>();
        pool.spawn(async move {
            let _ = hold_rx.await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Saturated, but the work still runs detached.
        let (tx, rx) = oneshot::channel();
        pool.spawn(async move {
            let _ = tx.send(());
        });
        rx.await.unwrap();
        drop(hold_tx);
    }
}
