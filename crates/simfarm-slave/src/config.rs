use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaveConfig {
    pub manager_address: String,
    /// Name announced in the hello frame; generated when unset
    pub slave_name: Option<String>,
    /// Where job scratch directories are created; system temp dir when unset
    pub work_dir: Option<PathBuf>,
    /// Command run inside each job directory; jobs are echoed back when empty
    pub command: Vec<String>,
    pub max_frame_bytes: usize,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        SlaveConfig {
            manager_address: "127.0.0.1:7070".to_string(),
            slave_name: None,
            work_dir: None,
            command: Vec::new(),
            max_frame_bytes: simfarm_protocol::MAX_MESSAGE_SIZE,
        }
    }
}

impl SlaveConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SlaveConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn generate_name(&self) -> String {
        use std::process;
        use uuid::Uuid;

        if let Some(name) = &self.slave_name {
            return name.clone();
        }

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let pid = process::id();
        let random = Uuid::new_v4().simple().to_string();

        format!("{}-{}-{}", hostname, pid, &random[..8])
    }
}
