use crate::JobName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEventKind {
    /// The job passed triage and is about to be executed
    Beginning,
    /// The job left the engine, successfully or not
    Completion,
}

/// One-way message to whoever submitted a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job: JobName,
    pub kind: JobEventKind,
    pub at: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(job: JobName, kind: JobEventKind) -> Self {
        JobEvent {
            job,
            kind,
            at: Utc::now(),
        }
    }
}

/// Fire-and-forget delivery of job events. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: JobEvent);
}

/// Writes events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: JobEvent) {
        match event.kind {
            JobEventKind::Beginning => info!(job = %event.job, "Job execution beginning"),
            JobEventKind::Completion => info!(job = %event.job, "Job finished"),
        }
    }
}

/// Forwards events into an unbounded channel. A dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<JobEvent>) -> Self {
        ChannelNotifier { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelNotifier { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }
}
