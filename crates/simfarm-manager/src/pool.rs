use crate::deque::BlockingDeque;
use crate::error::{DispatchError, Result};
use crate::worker::WorkerHandle;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// Bounded pool of idle workers.
///
/// A handle is in the pool exactly when no task holds it. `acquire` and
/// `release` move ownership in and out; workers whose connection died are
/// handed to [`discard`](Self::discard) instead of being released.
pub struct WorkerPool {
    idle: BlockingDeque<WorkerHandle>,
    registered: AtomicUsize,
    busy: AtomicUsize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        WorkerPool {
            idle: BlockingDeque::new(capacity),
            registered: AtomicUsize::new(0),
            busy: AtomicUsize::new(0),
        }
    }

    /// First release of a newly registered worker. The worker only counts as
    /// registered once it is in the pool; a cancelled enrollment leaves no trace.
    pub async fn enroll(&self, worker: WorkerHandle) -> Result<()> {
        // Counted up front so a racing acquire-and-discard cannot underflow.
        let pending = PendingEnrollment::new(&self.registered);
        self.idle.push_back(worker).await.map_err(|closed| {
            warn!(worker = %closed.0.name(), "Pool closed, dropping new worker");
            DispatchError::QueueClosed
        })?;
        pending.commit();
        Ok(())
    }

    /// Take an idle worker, waiting until one is available.
    pub async fn acquire(&self) -> Result<WorkerHandle> {
        self.idle.pop_front().await.map_err(|_| DispatchError::QueueClosed)
    }

    /// Return a worker to the pool, waiting if the pool is at capacity.
    pub async fn release(&self, worker: WorkerHandle) -> Result<()> {
        self.idle.push_back(worker).await.map_err(|closed| {
            self.discard(closed.0, "pool closed");
            DispatchError::QueueClosed
        })
    }

    /// Remove every idle worker at once, for a heartbeat sweep.
    /// Each one must be released again afterwards.
    pub fn drain_all(&self) -> Vec<WorkerHandle> {
        self.idle.drain()
    }

    /// Drop a worker whose connection failed. It is never re-enqueued.
    pub fn discard(&self, worker: WorkerHandle, reason: &str) {
        self.registered.fetch_sub(1, Ordering::SeqCst);
        warn!(worker = %worker.name(), id = %worker.id(), "Dropping worker: {}", reason);
    }

    /// Mark a held worker as executing a job.
    pub fn mark_busy(&self) {
        self.busy.fetch_add(1, Ordering::SeqCst);
    }

    /// Counterpart of [`mark_busy`](Self::mark_busy), called once the job is done.
    pub fn mark_done(&self) {
        self.busy.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Workers currently executing a job
    pub fn busy_count(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Workers enrolled and not yet discarded
    pub fn registered_count(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }
}

/// Undoes a registration unless committed.
struct PendingEnrollment<'a> {
    registered: &'a AtomicUsize,
    committed: bool,
}

impl<'a> PendingEnrollment<'a> {
    fn new(registered: &'a AtomicUsize) -> Self {
        registered.fetch_add(1, Ordering::SeqCst);
        PendingEnrollment {
            registered,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingEnrollment<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.registered.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
