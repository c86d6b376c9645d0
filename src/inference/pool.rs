//! Session-owned worker pool for concurrent batches.
//!
//! The rayon pool is built on first use. Creation is double-checked under a
//! write lock so racing callers share one pool. Shutdown waits a bounded time
//! for in-flight batches, then flags the rest as cancelled so queued units
//! return [`MiniLmError::Cancelled`] instead of running.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::errors::{MiniLmError, Result};

#[derive(Debug, Default)]
struct PoolState {
    in_flight: usize,
    shut_down: bool,
}

pub struct WorkerPool {
    threads: usize,
    pool: RwLock<Option<Arc<ThreadPool>>>,
    state: Mutex<PoolState>,
    idle: Condvar,
    cancelled: AtomicBool,
    created: AtomicUsize,
}

/// Counts one running batch; decrements and wakes `shutdown` on drop.
struct InFlight<'a>(&'a WorkerPool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.0.idle.notify_all();
        }
    }
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            pool: RwLock::new(None),
            state: Mutex::new(PoolState::default()),
            idle: Condvar::new(),
            cancelled: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Whether the underlying thread pool currently exists.
    pub fn is_started(&self) -> bool {
        self.pool.read().is_some()
    }

    /// How many thread pools have ever been built. Never exceeds 1.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    fn enter(&self) -> Result<InFlight<'_>> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(MiniLmError::SessionClosed);
        }
        state.in_flight += 1;
        Ok(InFlight(self))
    }

    fn get_or_start(&self) -> Result<Arc<ThreadPool>> {
        if let Some(pool) = self.pool.read().as_ref() {
            return Ok(Arc::clone(pool));
        }
        let mut slot = self.pool.write();
        if let Some(pool) = slot.as_ref() {
            return Ok(Arc::clone(pool));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("minilm-worker-{}", i))
            .build()
            .map_err(|e| MiniLmError::Inference(format!("failed to start worker pool: {}", e)))?;
        let pool = Arc::new(pool);
        *slot = Some(Arc::clone(&pool));
        self.created.fetch_add(1, Ordering::AcqRel);
        debug!(threads = self.threads, "worker pool started");
        Ok(pool)
    }

    /// Apply `f` to every item on the pool. Output order follows input order;
    /// the first error is returned and the remaining results are discarded.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync + Send,
    {
        let _in_flight = self.enter()?;
        let pool = self.get_or_start()?;
        pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    if self.cancelled.load(Ordering::Acquire) {
                        return Err(MiniLmError::Cancelled);
                    }
                    f(item)
                })
                .collect()
        })
    }

    /// Stop accepting batches and wait up to `grace` for running ones.
    ///
    /// Returns `false` if work was still running when the grace period ended
    /// and had to be cancelled. Later calls return `true` immediately.
    pub fn shutdown(&self, grace: Duration) -> bool {
        let mut state = self.state.lock();
        if state.shut_down {
            return true;
        }
        state.shut_down = true;
        let timed_out = self
            .idle
            .wait_while_for(&mut state, |s| s.in_flight > 0, grace)
            .timed_out();
        let stranded = state.in_flight;
        drop(state);

        if timed_out {
            self.cancelled.store(true, Ordering::Release);
            warn!(
                batches = stranded,
                grace_ms = grace.as_millis() as u64,
                "worker pool shutdown grace elapsed, cancelling queued work"
            );
        }
        // Running batches hold their own Arc; the threads exit once those finish.
        if self.pool.write().take().is_some() {
            debug!("worker pool released");
        }
        !timed_out
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("started", &self.is_started())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn pool_is_lazy_and_created_once() {
        let pool = Arc::new(WorkerPool::new(2));
        assert!(!pool.is_started());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.map(&[1u32, 2, 3], |x| Ok(x * 2)).unwrap())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![2, 4, 6]);
        }
        assert!(pool.is_started());
        assert_eq!(pool.created_count(), 1);
    }

    #[test]
    fn map_preserves_order_and_fails_fast() {
        let pool = WorkerPool::new(4);
        let items: Vec<u32> = (0..100).collect();
        let out = pool.map(&items, |&x| Ok(x + 1)).unwrap();
        assert_eq!(out, (1..=100).collect::<Vec<_>>());

        let err = pool
            .map(&items, |&x| {
                if x == 42 {
                    Err(MiniLmError::Validation("bad".into()))
                } else {
                    Ok(x)
                }
            })
            .unwrap_err();
        assert!(matches!(err, MiniLmError::Validation(_)));
    }

    #[test]
    fn shutdown_is_idempotent_and_rejects_new_work() {
        let pool = WorkerPool::new(1);
        pool.map(&[0u8], |_| Ok(())).unwrap();
        assert!(pool.shutdown(Duration::from_millis(100)));
        assert!(pool.shutdown(Duration::from_millis(100)));
        assert!(!pool.is_started());
        assert!(matches!(
            pool.map(&[0u8], |_| Ok(())),
            Err(MiniLmError::SessionClosed)
        ));
    }

    #[test]
    fn shutdown_without_start_never_builds_pool() {
        let pool = WorkerPool::new(2);
        assert!(pool.shutdown(Duration::ZERO));
        assert_eq!(pool.created_count(), 0);
    }

    #[test]
    fn grace_expiry_cancels_queued_units() {
        let pool = Arc::new(WorkerPool::new(1));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let worker = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let items: Vec<u32> = (0..64).collect();
                pool.map(&items, |&x| {
                    if x == 0 {
                        let _ = started_tx.send(());
                        let _ = release_rx.lock().recv();
                    }
                    Ok(x)
                })
            })
        };

        started_rx.recv().unwrap();
        assert!(!pool.shutdown(Duration::from_millis(20)));
        release_tx.send(()).unwrap();
        let result = worker.join().unwrap();
        assert!(matches!(result, Err(MiniLmError::Cancelled)));
    }
}
