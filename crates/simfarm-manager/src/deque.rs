//! Bounded, blocking double-ended queue shared by the worker pool and both
//! job queues.
//!
//! Two semaphores track the number of queued items and the number of free
//! slots. A permit from `filled` is always taken before an item is removed,
//! so the mutex-protected buffer never underflows. No await point sits
//! between taking a permit and touching the buffer, which keeps every
//! blocking operation cancel-safe.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Returned when the deque has been closed. Carries the rejected item, if any.
#[derive(Debug, PartialEq, Eq)]
pub struct Closed<T>(pub T);

pub struct BlockingDeque<T> {
    items: Mutex<VecDeque<T>>,
    filled: Semaphore,
    free: Semaphore,
    capacity: usize,
}

impl<T> BlockingDeque<T> {
    pub fn new(capacity: usize) -> Self {
        BlockingDeque {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            filled: Semaphore::new(0),
            free: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Append at the tail, waiting while the deque is full.
    pub async fn push_back(&self, item: T) -> Result<(), Closed<T>> {
        match self.free.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(Closed(item)),
        }
        self.items.lock().push_back(item);
        self.filled.add_permits(1);
        Ok(())
    }

    /// Append at the tail without waiting. Fails with the item if full or closed.
    pub fn try_push_back(&self, item: T) -> Result<(), T> {
        match self.free.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(item),
        }
        self.items.lock().push_back(item);
        self.filled.add_permits(1);
        Ok(())
    }

    /// Remove from the head, waiting while the deque is empty.
    pub async fn pop_front(&self) -> Result<T, Closed<()>> {
        self.take_filled().await?;
        Ok(self.remove(VecDeque::pop_front))
    }

    /// Remove from the tail, waiting while the deque is empty.
    pub async fn pop_back(&self) -> Result<T, Closed<()>> {
        self.take_filled().await?;
        Ok(self.remove(VecDeque::pop_back))
    }

    /// Like [`pop_front`](Self::pop_front) / [`pop_back`](Self::pop_back) but
    /// gives up after `wait`, returning `Ok(None)`.
    pub async fn pop_timeout(&self, from_back: bool, wait: Duration) -> Result<Option<T>, Closed<()>> {
        let pop = async {
            if from_back {
                self.pop_back().await
            } else {
                self.pop_front().await
            }
        };
        match tokio::time::timeout(wait, pop).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Remove every item currently queued, oldest first, without waiting.
    pub fn drain(&self) -> Vec<T> {
        let mut drained = Vec::new();
        while let Ok(permit) = self.filled.try_acquire() {
            permit.forget();
            drained.push(self.remove(VecDeque::pop_front));
        }
        drained
    }

    /// Wake every waiter with an error and refuse further pushes and pops.
    pub fn close(&self) {
        self.filled.close();
        self.free.close();
    }

    pub fn is_closed(&self) -> bool {
        self.free.is_closed()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn take_filled(&self) -> Result<(), Closed<()>> {
        match self.filled.acquire().await {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(_) => Err(Closed(())),
        }
    }

    fn remove(&self, take: fn(&mut VecDeque<T>) -> Option<T>) -> T {
        let item = {
            let mut items = self.items.lock();
            match take(&mut items) {
                Some(item) => item,
                // A filled permit guarantees an item; reaching this is a bug.
                None => unreachable!("filled permit taken from an empty deque"),
            }
        };
        self.free.add_permits(1);
        item
    }
}
