use crate::deque::BlockingDeque;
use crate::error::{DispatchError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use simfarm_core::Job;
use std::fmt;
use std::time::Duration;

/// Which end of the dispatch queue jobs are taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOrder {
    /// Oldest triaged job first
    #[default]
    Fifo,
    /// Newest triaged job first
    Lifo,
}

impl fmt::Display for DispatchOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOrder::Fifo => f.write_str("fifo"),
            DispatchOrder::Lifo => f.write_str("lifo"),
        }
    }
}

/// Single-ended FIFO queue of newly submitted jobs
pub struct ArrivalQueue {
    jobs: BlockingDeque<Job>,
}

impl ArrivalQueue {
    pub fn new(capacity: usize) -> Self {
        ArrivalQueue {
            jobs: BlockingDeque::new(capacity),
        }
    }

    pub async fn push(&self, job: Job) -> Result<()> {
        self.jobs
            .push_back(job)
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    /// Enqueue without waiting; a full queue rejects the job.
    pub fn try_push(&self, job: Job) -> Result<()> {
        if self.jobs.is_closed() {
            return Err(DispatchError::QueueClosed);
        }
        self.jobs.try_push_back(job).map_err(|_| DispatchError::QueueFull)
    }

    pub async fn pop(&self) -> Result<Job> {
        self.jobs
            .pop_front()
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    pub fn close(&self) {
        self.jobs.close();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Double-ended queue of triaged jobs. The pop end is fixed at construction.
pub struct DispatchQueue {
    jobs: BlockingDeque<Job>,
    order: DispatchOrder,
}

impl DispatchQueue {
    pub fn new(capacity: usize, order: DispatchOrder) -> Self {
        DispatchQueue {
            jobs: BlockingDeque::new(capacity),
            order,
        }
    }

    pub fn order(&self) -> DispatchOrder {
        self.order
    }

    pub async fn push(&self, job: Job) -> Result<()> {
        self.jobs
            .push_back(job)
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    /// Take the next job in dispatch order, or `None` after `wait`.
    pub async fn pop_timeout(&self, wait: Duration) -> Result<Option<Job>> {
        self.jobs
            .pop_timeout(self.order == DispatchOrder::Lifo, wait)
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    pub fn close(&self) {
        self.jobs.close();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
