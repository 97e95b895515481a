//! Resizable per-job worker pool.
//!
//! A semaphore-gated pool whose limit can shrink and grow while conversions
//! are running. Shrinking never interrupts a running conversion: permits that
//! are in use are retired when they are released.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

#[derive(Debug)]
struct Shared {
    semaphore: Arc<Semaphore>,
    /// Permits to retire as they are released
    debt: Mutex<usize>,
    limit: AtomicUsize,
    active: AtomicUsize,
}

impl Shared {
    fn debt(&self) -> std::sync::MutexGuard<'_, usize> {
        self.debt.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Bounded conversion concurrency for one job.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
    initial: usize,
}

/// A claimed worker slot, returned to the pool on drop.
#[derive(Debug)]
pub struct PoolPermit {
    permit: Option<OwnedSemaphorePermit>,
    shared: Arc<Shared>,
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        self.shared.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(permit) = self.permit.take() {
            let mut debt = self.shared.debt();
            if *debt > 0 {
                *debt -= 1;
                permit.forget();
            }
        }
    }
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        metrics::set_worker_pool_size(size);
        Self {
            shared: Arc::new(Shared {
                semaphore: Arc::new(Semaphore::new(size)),
                debt: Mutex::new(0),
                limit: AtomicUsize::new(size),
                active: AtomicUsize::new(0),
            }),
            initial: size,
        }
    }

    /// Wait for a free worker slot.
    pub async fn acquire(&self) -> WorkerResult<PoolPermit> {
        let permit = self
            .shared
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::job_failed("worker pool closed"))?;

        self.shared.active.fetch_add(1, Ordering::SeqCst);
        Ok(PoolPermit {
            permit: Some(permit),
            shared: self.shared.clone(),
        })
    }

    /// Change the concurrency limit, clamped to `1..=initial`.
    ///
    /// Returns the new limit.
    pub fn resize(&self, target: usize) -> usize {
        let target = target.clamp(1, self.initial);
        let mut debt = self.shared.debt();
        let current = self.shared.limit.load(Ordering::SeqCst);

        if target < current {
            let mut remove = current - target;
            while remove > 0 {
                match self.shared.semaphore.try_acquire() {
                    Ok(idle) => {
                        idle.forget();
                        remove -= 1;
                    }
                    Err(_) => break,
                }
            }
            *debt += remove;
        } else if target > current {
            let mut add = target - current;
            let cancelled = add.min(*debt);
            *debt -= cancelled;
            add -= cancelled;
            if add > 0 {
                self.shared.semaphore.add_permits(add);
            }
        }

        self.shared.limit.store(target, Ordering::SeqCst);
        drop(debt);

        if target != current {
            debug!(from = current, to = target, "Resized worker pool");
            metrics::set_worker_pool_size(target);
        }
        target
    }

    /// Current concurrency limit.
    pub fn limit(&self) -> usize {
        self.shared.limit.load(Ordering::SeqCst)
    }

    /// Workers currently holding a permit.
    pub fn active(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Size the pool was created with; the limit never exceeds it.
    pub fn initial(&self) -> usize {
        self.initial
    }
}
