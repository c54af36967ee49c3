//! Bounded task group with an explicit join barrier.
//!
//! Work items are pulled from a shared index by a fixed number of scoped
//! worker threads. `TaskGroup::run` returns only after every worker has
//! joined, with results placed back in input order.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

/// Cooperative cancellation flag shared between the submitter and workers.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates an uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once `cancel` has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Fixed-size pool of scoped workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskGroup {
    workers: NonZeroUsize,
}

impl TaskGroup {
    /// Pool with exactly `workers` threads.
    pub const fn new(workers: NonZeroUsize) -> Self {
        Self { workers }
    }

    /// Pool sized to the host's available parallelism (1 if unknown).
    pub fn with_available_parallelism() -> Self {
        Self::new(thread::available_parallelism().unwrap_or(NonZeroUsize::MIN))
    }

    /// Configured worker count.
    pub const fn workers(&self) -> usize {
        self.workers.get()
    }

    /// Runs `task` over every item and waits for all of them.
    ///
    /// # Arguments
    ///
    /// * `items` - Work items; each is processed exactly once.
    /// * `task` - Work function, called concurrently from worker threads.
    ///
    /// # Returns
    ///
    /// One result per item, in the order of `items`.
    pub fn run<T, R, F>(&self, items: &[T], task: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<R>>> = Mutex::new(items.iter().map(|_| None).collect());
        let workers = self.workers.get().min(items.len());

        thread::scope(|scope| {
            for _ in 0..workers {
                let _ = scope.spawn(|| {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(item) = items.get(index) else {
                            break;
                        };
                        let result = task(item);
                        slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(result);
                    }
                });
            }
        });

        slots
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .flatten()
            .collect()
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::with_available_parallelism()
    }
}
