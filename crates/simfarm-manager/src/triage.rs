use crate::error::Result;
use crate::metrics::ManagerMetrics;
use crate::queue::{ArrivalQueue, DispatchQueue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Moves jobs from the arrival queue to the dispatch queue, dropping every
/// job whose pre-check reports errors.
pub struct TriageLoop {
    arrival: Arc<ArrivalQueue>,
    dispatch: Arc<DispatchQueue>,
    metrics: Arc<ManagerMetrics>,
    cancel: CancellationToken,
}

impl TriageLoop {
    pub fn new(
        arrival: Arc<ArrivalQueue>,
        dispatch: Arc<DispatchQueue>,
        metrics: Arc<ManagerMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        TriageLoop {
            arrival,
            dispatch,
            metrics,
            cancel,
        }
    }

    pub async fn run(self) -> Result<()> {
        loop {
            let mut job = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Triage interrupted while waiting for jobs");
                    return Ok(());
                }
                job = self.arrival.pop() => job?,
            };
            self.metrics.arrival_queue_depth.set(self.arrival.len() as i64);

            let report = job.simulation().check_syntax().await;
            let error_count = report.error_count();
            if let Err(e) = job.mark_triaged(error_count) {
                error!(job = %job.name, "Skipping job in unexpected phase: {}", e);
                continue;
            }

            if error_count > 0 {
                warn!(job = %job.name, errors = error_count, "Job rejected by pre-check");
                for err in &report.errors {
                    debug!(job = %job.name, file = ?err.file, line = ?err.line, "{}", err.message);
                }
                self.metrics.inc_jobs("rejected");
                continue;
            }

            job.simulation().notify_beginning();
            let name = job.name.clone();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(job = %name, "Triage interrupted while queueing job for dispatch");
                    return Ok(());
                }
                pushed = self.dispatch.push(job) => pushed?,
            }
            self.metrics.dispatch_queue_depth.set(self.dispatch.len() as i64);
            info!(job = %name, "Job accepted for dispatch");
        }
    }
}
