use crate::acceptor::{bind_listener, ConnectionAcceptor};
use crate::config::ManagerConfig;
use crate::dispatch::DispatchLoop;
use crate::error::Result;
use crate::heartbeat::HeartbeatLoop;
use crate::loops::{self, LoopRegistry, LoopState};
use crate::metrics::ManagerMetrics;
use crate::pool::WorkerPool;
use crate::queue::{ArrivalQueue, DispatchOrder, DispatchQueue};
use crate::triage::TriageLoop;
use crate::worker::{Connection, WorkerHandle};
use serde::Serialize;
use simfarm_core::{DirectorySimulation, Job, JobName, Notifier, Simulation, TracingNotifier};
use simfarm_protocol::MessageCodec;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, Instrument, Span};

/// Point-in-time view of the engine
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub order: DispatchOrder,
    pub workers_registered: usize,
    pub workers_idle: usize,
    pub workers_busy: usize,
    pub arrival_queue_depth: usize,
    pub dispatch_queue_depth: usize,
    pub jobs_in_flight: usize,
    pub loops: BTreeMap<&'static str, LoopState>,
}

/// The dispatch engine: worker pool, both job queues and the four loops
pub struct Manager {
    config: Arc<ManagerConfig>,
    pool: Arc<WorkerPool>,
    arrival: Arc<ArrivalQueue>,
    dispatch: Arc<DispatchQueue>,
    metrics: Arc<ManagerMetrics>,
    loops: Arc<LoopRegistry>,
    notifier: Arc<dyn Notifier>,
    codec: MessageCodec,
    jobs: TaskTracker,
    shutdown: CancellationToken,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> anyhow::Result<Self> {
        Self::with_notifier(config, Arc::new(TracingNotifier))
    }

    /// Build a manager whose directory jobs report to `notifier`.
    pub fn with_notifier(config: ManagerConfig, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        config.validate()?;
        let dispatch = &config.dispatch;

        Ok(Manager {
            pool: Arc::new(WorkerPool::new(dispatch.pool_capacity)),
            arrival: Arc::new(ArrivalQueue::new(dispatch.arrival_capacity)),
            dispatch: Arc::new(DispatchQueue::new(dispatch.dispatch_capacity, dispatch.order)),
            metrics: Arc::new(ManagerMetrics::new()?),
            loops: Arc::new(LoopRegistry::new()),
            notifier,
            codec: MessageCodec::new(config.manager.max_frame_bytes),
            jobs: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            config: Arc::new(config),
        })
    }

    /// Bind the worker endpoint, start every loop and run until shutdown.
    /// In-flight jobs are allowed to finish before this returns.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr: SocketAddr = self.config.listen_address().parse()?;
        let listener = bind_listener(addr)?;
        info!("Manager listening for workers on {}", addr);

        self.start_acceptor(listener);
        self.start_engine();

        self.shutdown.cancelled().await;
        info!("Shutting down, waiting for {} in-flight jobs", self.jobs.len());
        self.jobs.close();
        self.jobs.wait().await;
        Ok(())
    }

    /// Start triage, dispatch and heartbeat.
    pub fn start_engine(&self) {
        let triage = TriageLoop::new(
            self.arrival.clone(),
            self.dispatch.clone(),
            self.metrics.clone(),
            self.shutdown.child_token(),
        );
        let arrival = self.arrival.clone();
        self.spawn_loop(loops::TRIAGE, info_span!("triage"), async move {
            let stopped = triage.run().await;
            // Nothing drains arrivals any more; refuse new submissions.
            arrival.close();
            stopped
        });

        let dispatch = DispatchLoop::new(
            self.pool.clone(),
            self.dispatch.clone(),
            self.metrics.clone(),
            self.config.heartbeat_interval(),
            self.jobs.clone(),
            self.shutdown.child_token(),
        );
        self.spawn_loop(loops::DISPATCH, info_span!("dispatch"), dispatch.run());

        let heartbeat = HeartbeatLoop::new(
            self.pool.clone(),
            self.metrics.clone(),
            self.config.heartbeat_interval(),
            self.shutdown.child_token(),
        );
        self.spawn_loop(loops::HEARTBEAT, info_span!("heartbeat"), heartbeat.run());
    }

    /// Start accepting workers on an already bound listener.
    pub fn start_acceptor(&self, listener: TcpListener) {
        let acceptor = ConnectionAcceptor::new(
            listener,
            self.pool.clone(),
            self.metrics.clone(),
            self.codec,
            self.shutdown.child_token(),
        );
        self.spawn_loop(loops::ACCEPTOR, info_span!("acceptor"), acceptor.run());
    }

    /// Handshake and enroll a worker reached over an arbitrary connection.
    pub async fn enroll<S: Connection>(&self, stream: S) -> Result<String> {
        let worker = WorkerHandle::handshake(stream, self.codec).await?;
        let name = worker.name().to_string();
        self.pool.enroll(worker).await?;
        self.metrics
            .workers_registered
            .set(self.pool.registered_count() as i64);
        info!(worker = %name, "Worker registered");
        Ok(name)
    }

    /// Queue a job for triage, waiting if the arrival queue is full.
    pub async fn submit(&self, simulation: Arc<dyn Simulation>) -> Result<JobName> {
        let job = Job::new(simulation);
        let name = job.name.clone();
        self.arrival.push(job).await?;
        self.after_submit(&name);
        Ok(name)
    }

    /// Queue a job for triage, failing with [`QueueFull`](crate::DispatchError::QueueFull) instead of waiting.
    pub fn try_submit(&self, simulation: Arc<dyn Simulation>) -> Result<JobName> {
        let job = Job::new(simulation);
        let name = job.name.clone();
        self.arrival.try_push(job)?;
        self.after_submit(&name);
        Ok(name)
    }

    /// A job backed by `source_dir`, using the configured pre-check and result root.
    pub fn directory_job(&self, source_dir: PathBuf, result_root: Option<PathBuf>) -> Arc<dyn Simulation> {
        let result_root = result_root.unwrap_or_else(|| self.config.jobs.result_root.clone());
        Arc::new(
            DirectorySimulation::new(source_dir, result_root, self.notifier.clone())
                .with_precheck(self.config.jobs.precheck_command.clone()),
        )
    }

    pub fn stats(&self) -> ManagerStats {
        let stats = ManagerStats {
            order: self.dispatch.order(),
            workers_registered: self.pool.registered_count(),
            workers_idle: self.pool.idle_count(),
            workers_busy: self.pool.busy_count(),
            arrival_queue_depth: self.arrival.len(),
            dispatch_queue_depth: self.dispatch.len(),
            jobs_in_flight: self.jobs.len(),
            loops: self.loops.snapshot(),
        };
        self.metrics.update_gauges(
            stats.workers_registered,
            stats.workers_idle,
            stats.workers_busy,
            stats.arrival_queue_depth,
            stats.dispatch_queue_depth,
        );
        stats
    }

    pub fn config(&self) -> Arc<ManagerConfig> {
        self.config.clone()
    }

    pub fn metrics(&self) -> Arc<ManagerMetrics> {
        self.metrics.clone()
    }

    pub fn pool(&self) -> Arc<WorkerPool> {
        self.pool.clone()
    }

    /// Current state of each of the four loops.
    pub fn loop_states(&self) -> BTreeMap<&'static str, LoopState> {
        self.loops.snapshot()
    }

    /// Stop every loop and refuse new jobs. Dispatched jobs run to completion;
    /// jobs still queued are dropped.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.arrival.close();
        self.dispatch.close();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn after_submit(&self, name: &JobName) {
        self.metrics.inc_jobs("submitted");
        self.metrics.arrival_queue_depth.set(self.arrival.len() as i64);
        info!(job = %name, "Job submitted");
    }

    fn spawn_loop<F>(&self, name: &'static str, span: Span, run: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let registry = self.loops.clone();
        registry.set(name, LoopState::Running);
        tokio::spawn(
            async move {
                match run.await {
                    Ok(()) => {
                        info!("{} loop stopped", name);
                        registry.set(name, LoopState::Stopped);
                    }
                    Err(e) => {
                        error!("{} loop terminated: {}", name, e);
                        registry.set(name, LoopState::Failed(e.to_string()));
                    }
                }
            }
            .instrument(span),
        );
    }
}
