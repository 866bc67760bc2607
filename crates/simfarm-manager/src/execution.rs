use crate::metrics::ManagerMetrics;
use crate::pool::WorkerPool;
use crate::worker::WorkerHandle;
use simfarm_core::archive;
use simfarm_core::{Job, JobError};
use simfarm_protocol::ResultFrame;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One (worker, job) pairing, run to completion exactly once.
///
/// The worker goes back to the pool whatever happens to the job.
pub struct JobExecutionTask {
    worker: WorkerHandle,
    job: Job,
    pool: Arc<WorkerPool>,
    metrics: Arc<ManagerMetrics>,
    cancel: CancellationToken,
}

impl JobExecutionTask {
    pub fn new(
        worker: WorkerHandle,
        job: Job,
        pool: Arc<WorkerPool>,
        metrics: Arc<ManagerMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        JobExecutionTask {
            worker,
            job,
            pool,
            metrics,
            cancel,
        }
    }

    pub async fn run(self) {
        let JobExecutionTask {
            mut worker,
            mut job,
            pool,
            metrics,
            cancel,
        } = self;

        pool.mark_busy();
        metrics.workers_busy.set(pool.busy_count() as i64);
        if let Err(e) = job.mark_dispatched(worker.name()) {
            warn!(job = %job.name, "Dispatching job in unexpected phase: {}", e);
        }
        metrics.inc_jobs("dispatched");
        info!(job = %job.name, worker = %worker.name(), "Job dispatched");

        let started = Instant::now();
        let outcome = handle_job(&mut worker, &job).await;
        // Submitters hear about completion even when handling failed.
        job.simulation().notify_completion();
        metrics.job_duration.observe(started.elapsed().as_secs_f64());

        match outcome {
            Ok(result_dir) => {
                info!(job = %job.name, "Job completed, results in {}", result_dir.display());
                let _ = job.mark_completed();
                metrics.inc_jobs("completed");
            }
            Err(e) => {
                error!(job = %job.name, worker = %worker.name(), "Job failed: {}", e);
                let _ = job.mark_failed(e.to_string());
                metrics.inc_jobs("failed");
            }
        }

        pool.mark_done();
        metrics.workers_busy.set(pool.busy_count() as i64);

        let name = worker.name().to_string();
        tokio::select! {
            biased;
            released = pool.release(worker) => match released {
                Ok(()) => debug!(worker = %name, "Worker returned to pool"),
                Err(e) => warn!(worker = %name, "Worker could not be returned: {}", e),
            },
            _ = cancel.cancelled() => {
                warn!(worker = %name, "Release interrupted, worker abandoned");
            }
        }
        metrics.workers_idle.set(pool.idle_count() as i64);
    }
}

/// Package, ship, wait, unpack, analyse. Returns the result directory.
async fn handle_job(worker: &mut WorkerHandle, job: &Job) -> Result<PathBuf, JobError> {
    let simulation = job.simulation();

    let archive_path = simulation.package().await?;
    let payload = tokio::fs::read(&archive_path)
        .await
        .map_err(|e| JobError::Packaging(format!("{}: {}", archive_path.display(), e)))?;
    if let Err(e) = tokio::fs::remove_file(&archive_path).await {
        debug!(job = %job.name, "Could not remove staged archive: {}", e);
    }

    debug!(job = %job.name, bytes = payload.len(), "Sending payload");
    worker
        .send_payload(job.name.as_str(), payload)
        .await
        .map_err(|e| JobError::Transfer(e.to_string()))?;

    // The worker answers every payload. Its frame is consumed even when the
    // job is already lost, so the connection stays in step for the next job.
    let result_dir = job.fresh_result_dir();
    let prepared = create_result_dir(&result_dir).await;
    let frame = receive_result(worker, job).await?;
    prepared?;
    if let Some(error) = frame.error {
        return Err(JobError::Remote(error));
    }

    let received = result_dir.join(format!("{}.result.bundle", job.name.stem()));
    tokio::fs::write(&received, &frame.archive).await?;
    let dest = result_dir.clone();
    let archive = frame.archive;
    tokio::task::spawn_blocking(move || archive::unpack(&archive, &dest))
        .await
        .map_err(|e| JobError::Archive(e.to_string()))??;
    tokio::fs::remove_file(&received).await?;

    simulation.analyze(&result_dir).await?;
    Ok(result_dir)
}

async fn create_result_dir(dir: &Path) -> Result<(), JobError> {
    let into_err = |source| JobError::ResultDir {
        path: dir.to_path_buf(),
        source,
    };
    if let Some(parent) = dir.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(into_err)?;
    }
    // Fresh means fresh: an existing directory is an error.
    tokio::fs::create_dir(dir).await.map_err(into_err)
}

/// Block for this job's result frame. Frames for other jobs are left over
/// from earlier exchanges and are skipped.
async fn receive_result(worker: &mut WorkerHandle, job: &Job) -> Result<ResultFrame, JobError> {
    loop {
        let frame = worker
            .recv_result()
            .await
            .map_err(|e| JobError::Transfer(e.to_string()))?;
        if frame.job_name == job.name.as_str() {
            debug!(job = %job.name, bytes = frame.archive.len(), "Result received");
            return Ok(frame);
        }
        warn!(
            job = %job.name,
            worker = %worker.name(),
            "Skipping stale result for {}",
            frame.job_name
        );
    }
}
