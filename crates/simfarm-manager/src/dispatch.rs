use crate::error::Result;
use crate::execution::JobExecutionTask;
use crate::metrics::ManagerMetrics;
use crate::pool::WorkerPool;
use crate::queue::DispatchQueue;
use crate::worker::WorkerHandle;
use simfarm_core::Job;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};

enum Fetch {
    Job(WorkerHandle, Job),
    /// The held worker's connection died while waiting; pick another.
    WorkerLost,
    Interrupted,
}

/// Pairs idle workers with triaged jobs and hands each pair to its own task.
pub struct DispatchLoop {
    pool: Arc<WorkerPool>,
    queue: Arc<DispatchQueue>,
    metrics: Arc<ManagerMetrics>,
    keepalive_interval: Duration,
    jobs: TaskTracker,
    cancel: CancellationToken,
}

impl DispatchLoop {
    pub fn new(
        pool: Arc<WorkerPool>,
        queue: Arc<DispatchQueue>,
        metrics: Arc<ManagerMetrics>,
        keepalive_interval: Duration,
        jobs: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        DispatchLoop {
            pool,
            queue,
            metrics,
            keepalive_interval,
            jobs,
            cancel,
        }
    }

    pub async fn run(self) -> Result<()> {
        info!(order = %self.queue.order(), "Dispatching jobs");
        loop {
            let worker = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Dispatch interrupted while waiting for a worker");
                    return Ok(());
                }
                worker = self.pool.acquire() => worker?,
            };
            self.metrics.workers_idle.set(self.pool.idle_count() as i64);

            let (worker, job) = match self.next_job(worker).await? {
                Fetch::Job(worker, job) => (worker, job),
                Fetch::WorkerLost => continue,
                Fetch::Interrupted => return Ok(()),
            };
            self.metrics.dispatch_queue_depth.set(self.queue.len() as i64);

            let span = info_span!("job", job = %job.name, worker = %worker.name());
            let task = JobExecutionTask::new(
                worker,
                job,
                self.pool.clone(),
                self.metrics.clone(),
                self.cancel.clone(),
            );
            self.jobs.spawn(task.run().instrument(span));
        }
    }

    /// Wait for a job while holding `worker`, keeping its connection warm
    /// with a keepalive every interval.
    async fn next_job(&self, mut worker: WorkerHandle) -> Result<Fetch> {
        loop {
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(worker = %worker.name(), "Dispatch interrupted while waiting for a job");
                    return Ok(Fetch::Interrupted);
                }
                fetched = self.queue.pop_timeout(self.keepalive_interval) => fetched,
            };

            match fetched {
                Ok(Some(job)) => return Ok(Fetch::Job(worker, job)),
                Ok(None) => {
                    if let Err(e) = worker.send_keepalive().await {
                        warn!(worker = %worker.name(), "Keepalive to held worker failed: {}", e);
                        self.pool.discard(worker, "keepalive failed");
                        self.metrics
                            .workers_registered
                            .set(self.pool.registered_count() as i64);
                        return Ok(Fetch::WorkerLost);
                    }
                    self.metrics.keepalives_sent.inc();
                }
                Err(e) => {
                    // Hand the worker back before giving up so it is not leaked.
                    error!("Fetching the next job failed: {}", e);
                    if self.pool.release(worker).await.is_err() {
                        warn!("Held worker could not be returned to the pool");
                    }
                    return Err(e);
                }
            }
        }
    }
}
