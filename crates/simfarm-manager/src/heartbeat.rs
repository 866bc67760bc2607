use crate::error::{DispatchError, Result};
use crate::metrics::ManagerMetrics;
use crate::pool::WorkerPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Periodically sends a keepalive to every idle worker.
///
/// A failed send stops the sweep for good; the failing worker is dropped and
/// the rest of the batch is put back first.
pub struct HeartbeatLoop {
    pool: Arc<WorkerPool>,
    metrics: Arc<ManagerMetrics>,
    interval: Duration,
    cancel: CancellationToken,
}

impl HeartbeatLoop {
    pub fn new(
        pool: Arc<WorkerPool>,
        metrics: Arc<ManagerMetrics>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        HeartbeatLoop {
            pool,
            metrics,
            interval,
            cancel,
        }
    }

    pub async fn run(self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; sweeps start one interval in.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Heartbeat interrupted");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            self.sweep().await?;
        }
    }

    async fn sweep(&self) -> Result<()> {
        let mut batch = self.pool.drain_all().into_iter();
        let mut swept = 0usize;

        while let Some(mut worker) = batch.next() {
            if let Err(source) = worker.send_keepalive().await {
                let name = worker.name().to_string();
                error!(worker = %name, "Keepalive failed, stopping heartbeat: {}", source);
                self.pool.discard(worker, "keepalive failed");
                for rest in batch {
                    self.pool.release(rest).await?;
                }
                self.metrics
                    .workers_registered
                    .set(self.pool.registered_count() as i64);
                return Err(DispatchError::Keepalive {
                    worker: name,
                    source,
                });
            }
            self.metrics.keepalives_sent.inc();
            swept += 1;
            self.pool.release(worker).await?;
        }

        debug!(workers = swept, "Heartbeat sweep done");
        self.metrics.workers_idle.set(self.pool.idle_count() as i64);
        Ok(())
    }
}
