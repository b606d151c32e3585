//! Concurrency gate for resolver invocations
//!
//! Bounds how many resolver processes run at once. Excess work waits in a
//! strict FIFO queue; tokio's semaphore hands permits out in request order.

use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tracing::{debug, trace};

use crate::error::ResolveError;

/// Counter snapshot for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub max_concurrent: usize,
    pub running: usize,
    pub queued: usize,
    pub peak_queued: usize,
    pub admitted_total: u64,
    pub completed_total: u64,
}

/// FIFO admission gate with a fixed number of slots
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Semaphore,
    max_concurrent: usize,
    running: AtomicUsize,
    queued: AtomicUsize,
    peak_queued: AtomicUsize,
    admitted_total: AtomicU64,
    completed_total: AtomicU64,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `max_concurrent` tasks (minimum 1)
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            running: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            peak_queued: AtomicUsize::new(0),
            admitted_total: AtomicU64::new(0),
            completed_total: AtomicU64::new(0),
        }
    }

    /// Run `task` once a slot is free
    ///
    /// The slot is released when the task finishes or when the returned
    /// future is dropped, whichever happens first. Fails with
    /// [`ResolveError::Terminated`] once the gate has been closed.
    pub async fn run<F, T>(&self, task: F) -> Result<T, ResolveError>
    where
        F: Future<Output = T>,
    {
        let _slot = self.admit().await?;
        Ok(task.await)
    }

    async fn admit(&self) -> Result<Slot<'_>, ResolveError> {
        let permit = match self.semaphore.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(ResolveError::Terminated),
            Err(TryAcquireError::NoPermits) => {
                let waiting = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak_queued.fetch_max(waiting, Ordering::SeqCst);
                let _queued = QueuedGuard(&self.queued);

                trace!("Gate: waiting for slot ({} queued)", waiting);
                self.semaphore
                    .acquire()
                    .await
                    .map_err(|_| ResolveError::Terminated)?
            }
        };

        self.running.fetch_add(1, Ordering::SeqCst);
        self.admitted_total.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Gate: admitted ({}/{} running)",
            self.running.load(Ordering::SeqCst),
            self.max_concurrent
        );

        Ok(Slot {
            gate: self,
            _permit: permit,
        })
    }

    /// True when more than `ceiling` tasks are waiting for a slot
    pub fn is_overloaded(&self, ceiling: usize) -> bool {
        self.queued.load(Ordering::SeqCst) > ceiling
    }

    /// Stop admitting work; queued and future callers get `Terminated`
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            max_concurrent: self.max_concurrent,
            running: self.running.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
            peak_queued: self.peak_queued.load(Ordering::SeqCst),
            admitted_total: self.admitted_total.load(Ordering::SeqCst),
            completed_total: self.completed_total.load(Ordering::SeqCst),
        }
    }
}

struct QueuedGuard<'a>(&'a AtomicUsize);

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Slot<'a> {
    gate: &'a ConcurrencyGate,
    _permit: SemaphorePermit<'a>,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.gate.running.fetch_sub(1, Ordering::SeqCst);
        self.gate.completed_total.fetch_add(1, Ordering::SeqCst);
    }
}
