use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// Prometheus metrics for the manager
pub struct ManagerMetrics {
    pub registry: Registry,

    // Job counters
    pub jobs_total: IntCounterVec,

    // Worker gauges
    pub workers_registered: IntGauge,
    pub workers_idle: IntGauge,
    pub workers_busy: IntGauge,

    // Queue depth
    pub arrival_queue_depth: IntGauge,
    pub dispatch_queue_depth: IntGauge,

    pub job_duration: Histogram,
    pub keepalives_sent: IntCounter,
}

impl ManagerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("sf_jobs_total", "Jobs by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(jobs_total.clone()))?;

        let workers_registered =
            IntGauge::new("sf_workers_registered", "Workers enrolled and still connected")?;
        registry.register(Box::new(workers_registered.clone()))?;

        let workers_idle = IntGauge::new("sf_workers_idle", "Workers waiting in the pool")?;
        registry.register(Box::new(workers_idle.clone()))?;

        let workers_busy = IntGauge::new("sf_workers_busy", "Workers executing a job")?;
        registry.register(Box::new(workers_busy.clone()))?;

        let arrival_queue_depth =
            IntGauge::new("sf_arrival_queue_depth", "Jobs waiting for triage")?;
        registry.register(Box::new(arrival_queue_depth.clone()))?;

        let dispatch_queue_depth =
            IntGauge::new("sf_dispatch_queue_depth", "Triaged jobs waiting for a worker")?;
        registry.register(Box::new(dispatch_queue_depth.clone()))?;

        let job_duration = Histogram::with_opts(
            HistogramOpts::new(
                "sf_job_duration_seconds",
                "Time from dispatch to completion, including analysis",
            )
            .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 4.0 * 3600.0, 12.0 * 3600.0]),
        )?;
        registry.register(Box::new(job_duration.clone()))?;

        let keepalives_sent =
            IntCounter::new("sf_keepalives_sent_total", "Keepalive frames written to workers")?;
        registry.register(Box::new(keepalives_sent.clone()))?;

        Ok(ManagerMetrics {
            registry,
            jobs_total,
            workers_registered,
            workers_idle,
            workers_busy,
            arrival_queue_depth,
            dispatch_queue_depth,
            job_duration,
            keepalives_sent,
        })
    }

    /// Increment the job counter for an outcome
    /// (submitted, rejected, dispatched, completed, failed)
    pub fn inc_jobs(&self, outcome: &str) {
        self.jobs_total.with_label_values(&[outcome]).inc();
    }

    pub fn jobs(&self, outcome: &str) -> u64 {
        self.jobs_total.with_label_values(&[outcome]).get()
    }

    /// Refresh the worker and queue gauges
    pub fn update_gauges(&self, registered: usize, idle: usize, busy: usize, arrival: usize, dispatch: usize) {
        self.workers_registered.set(registered as i64);
        self.workers_idle.set(idle as i64);
        self.workers_busy.set(busy as i64);
        self.arrival_queue_depth.set(arrival as i64);
        self.dispatch_queue_depth.set(dispatch as i64);
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        use prometheus::{Encoder, TextEncoder};

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
