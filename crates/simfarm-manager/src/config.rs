use crate::error::DispatchError;
use crate::queue::DispatchOrder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub manager: NetworkConfig,
    pub dispatch: DispatchConfig,
    pub jobs: JobsConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    pub max_frame_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub order: DispatchOrder,
    pub heartbeat_interval_ms: u64,
    pub pool_capacity: usize,
    pub arrival_capacity: usize,
    pub dispatch_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub result_root: PathBuf,
    /// Pre-check command (argv) run in each job's source directory
    pub precheck_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub rest_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub prometheus_port: u16,
    pub log_level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            host: "0.0.0.0".to_string(),
            port: 7070,
            max_frame_bytes: simfarm_protocol::MAX_MESSAGE_SIZE,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            order: DispatchOrder::Fifo,
            heartbeat_interval_ms: 30_000,
            pool_capacity: 1024,
            arrival_capacity: 1000,
            dispatch_capacity: 1000,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        JobsConfig {
            result_root: PathBuf::from("./results"),
            precheck_command: Vec::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            enabled: true,
            rest_port: 8080,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            prometheus_port: 9091,
            log_level: "info".to_string(),
        }
    }
}

impl ManagerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ManagerConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        let dispatch = &self.dispatch;
        if dispatch.heartbeat_interval_ms == 0 {
            return Err(DispatchError::Config(
                "dispatch.heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("dispatch.pool_capacity", dispatch.pool_capacity),
            ("dispatch.arrival_capacity", dispatch.arrival_capacity),
            ("dispatch.dispatch_capacity", dispatch.dispatch_capacity),
            ("manager.max_frame_bytes", self.manager.max_frame_bytes),
        ] {
            if value == 0 {
                return Err(DispatchError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch.heartbeat_interval_ms)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.manager.host, self.manager.port)
    }
}
