#![allow(dead_code)]

use async_trait::async_trait;
use futures::SinkExt;
use parking_lot::Mutex;
use simfarm_core::{ChannelNotifier, DirectorySimulation, JobEvent, JobEventKind, Simulation};
use simfarm_manager::{DispatchOrder, Manager, ManagerConfig};
use simfarm_protocol::{Message, MessageCodec};
use simfarm_slave::{JobRunner, Slave, SlaveConfig, SlaveError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::codec::Framed;

/// Every job run by any [`RecordingRunner`], as (slave, job name), in order.
pub type RunLog = Arc<Mutex<Vec<(String, String)>>>;

/// Echoes inputs back after an optional delay and records what it ran.
/// Jobs whose name ends with `fail_suffix` fail.
pub struct RecordingRunner {
    pub slave: String,
    pub log: RunLog,
    pub delay: Duration,
    pub fail_suffix: Option<String>,
}

#[async_trait]
impl JobRunner for RecordingRunner {
    async fn run(&self, job_name: &str, job_dir: &Path) -> Result<PathBuf, SlaveError> {
        self.log
            .lock()
            .push((self.slave.clone(), job_name.to_string()));
        tokio::time::sleep(self.delay).await;
        if let Some(suffix) = &self.fail_suffix {
            if job_name.ends_with(suffix.as_str()) {
                return Err(SlaveError::Runner(format!("{} crashed", job_name)));
            }
        }
        Ok(job_dir.to_path_buf())
    }
}

pub fn config(order: DispatchOrder, heartbeat_ms: u64) -> ManagerConfig {
    let mut config = ManagerConfig::default();
    config.dispatch.order = order;
    config.dispatch.heartbeat_interval_ms = heartbeat_ms;
    config
}

/// A farm with a temp workspace and a channel receiving all job events.
pub struct Farm {
    pub manager: Arc<Manager>,
    pub events: UnboundedReceiver<JobEvent>,
    pub notifier: Arc<ChannelNotifier>,
    pub log: RunLog,
    pub workspace: tempfile::TempDir,
}

impl Farm {
    pub fn new(config: ManagerConfig) -> Self {
        let (notifier, events) = ChannelNotifier::channel();
        let notifier = Arc::new(notifier);
        let manager = Arc::new(Manager::with_notifier(config, notifier.clone()).unwrap());
        Farm {
            manager,
            events,
            notifier,
            log: Arc::new(Mutex::new(Vec::new())),
            workspace: tempfile::tempdir().unwrap(),
        }
    }

    pub fn result_root(&self) -> PathBuf {
        self.workspace.path().join("results")
    }

    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.workspace.path().join("src").join(name)
    }

    /// A directory job with one source file and an optional pre-check script.
    pub fn job(&self, name: &str, precheck: Option<&str>) -> Arc<dyn Simulation> {
        self.job_in(name, precheck, self.result_root())
    }

    /// Like [`Farm::job`], with results written below `result_root`.
    pub fn job_in(&self, name: &str, precheck: Option<&str>, result_root: PathBuf) -> Arc<dyn Simulation> {
        let source = self.source_dir(name);
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("tb.sv"), format!("module {}; endmodule\n", name)).unwrap();

        let mut sim = DirectorySimulation::new(source, result_root, self.notifier.clone());
        if let Some(script) = precheck {
            sim = sim.with_precheck(vec!["sh".into(), "-c".into(), script.into()]);
        }
        Arc::new(sim)
    }

    /// Start a slave over an in-memory connection and enroll it.
    pub async fn add_slave(&self, name: &str, delay: Duration, fail_suffix: Option<&str>) -> Arc<Slave> {
        let runner = RecordingRunner {
            slave: name.to_string(),
            log: self.log.clone(),
            delay,
            fail_suffix: fail_suffix.map(str::to_string),
        };
        let slave = Arc::new(Slave::new(
            &SlaveConfig {
                slave_name: Some(name.to_string()),
                work_dir: Some(self.workspace.path().join("scratch")),
                ..Default::default()
            },
            Arc::new(runner),
        ));

        let (manager_side, slave_side) = tokio::io::duplex(256 * 1024);
        let serving = slave.clone();
        tokio::spawn(async move { serving.serve(slave_side).await });
        let enrolled = self.manager.enroll(manager_side).await.unwrap();
        assert_eq!(enrolled, name);
        slave
    }

    /// Enroll a raw connection that says hello and nothing else. Dropping the
    /// returned end kills the worker.
    pub async fn add_ghost(&self, name: &str) -> Framed<DuplexStream, MessageCodec> {
        let (manager_side, slave_side) = tokio::io::duplex(4096);
        let mut ghost = Framed::new(slave_side, MessageCodec::default());
        ghost.send(Message::Hello(name.to_string())).await.unwrap();
        self.manager.enroll(manager_side).await.unwrap();
        ghost
    }

    /// Wait for `count` completion events and return their job names.
    pub async fn completions(&mut self, count: usize) -> Vec<String> {
        let mut done = Vec::new();
        while done.len() < count {
            let event = tokio::time::timeout(Duration::from_secs(10), self.events.recv())
                .await
                .expect("timed out waiting for job events")
                .expect("event channel closed");
            if event.kind == JobEventKind::Completion {
                done.push(event.job.to_string());
            }
        }
        done
    }

    /// Names of jobs the runners saw, in execution order.
    pub fn ran(&self) -> Vec<String> {
        self.log.lock().iter().map(|(_, job)| job.clone()).collect()
    }
}

/// Poll `condition` until it holds or a few seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
