use crate::error::{Result, SlaveError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

/// Log file written into the job directory by [`CommandRunner`]
pub const RUN_LOG: &str = "run.log";

/// Runs one unpacked job
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the job whose inputs are in `job_dir` and return the directory
    /// whose contents are shipped back as the result.
    async fn run(&self, job_name: &str, job_dir: &Path) -> Result<PathBuf>;
}

/// Returns the inputs unchanged
pub struct EchoRunner;

#[async_trait]
impl JobRunner for EchoRunner {
    async fn run(&self, job_name: &str, job_dir: &Path) -> Result<PathBuf> {
        debug!(job = job_name, "Echoing job inputs");
        Ok(job_dir.to_path_buf())
    }
}

/// Runs a fixed command inside the job directory.
///
/// The combined output is kept in `run.log` next to whatever the command
/// produced, and the whole directory becomes the result. A non-zero exit
/// fails the job.
pub struct CommandRunner {
    argv: Vec<String>,
}

impl CommandRunner {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            return Err(SlaveError::Runner("empty command".to_string()));
        }
        Ok(CommandRunner { argv })
    }
}

#[async_trait]
impl JobRunner for CommandRunner {
    async fn run(&self, job_name: &str, job_dir: &Path) -> Result<PathBuf> {
        info!(job = job_name, command = ?self.argv, "Running job");

        let output = tokio::process::Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .current_dir(job_dir)
            .env("SIMFARM_JOB", job_name)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SlaveError::Runner(format!("{}: {}", self.argv[0], e)))?;

        let mut log = output.stdout;
        log.extend_from_slice(&output.stderr);
        tokio::fs::write(job_dir.join(RUN_LOG), &log).await?;

        if !output.status.success() {
            return Err(SlaveError::Runner(format!(
                "{} exited with {}",
                self.argv[0], output.status
            )));
        }
        Ok(job_dir.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandRunner {
        CommandRunner::new(vec!["sh".into(), "-c".into(), script.into()]).unwrap()
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandRunner::new(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_echo_runner_returns_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = EchoRunner.run("job", dir.path()).await.unwrap();
        assert_eq!(out, dir.path());
    }

    #[tokio::test]
    async fn test_command_runner_writes_outputs_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let runner = sh("echo simulating $SIMFARM_JOB; echo PASS > waves.vcd");

        let out = runner.run("alu_tb", dir.path()).await.unwrap();
        assert_eq!(out, dir.path());
        assert_eq!(std::fs::read_to_string(dir.path().join("waves.vcd")).unwrap(), "PASS\n");
        let log = std::fs::read_to_string(dir.path().join(RUN_LOG)).unwrap();
        assert!(log.contains("simulating alu_tb"));
    }

    #[tokio::test]
    async fn test_command_runner_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh("echo boom >&2; exit 3").run("j", dir.path()).await.unwrap_err();
        assert!(matches!(err, SlaveError::Runner(_)));
        let log = std::fs::read_to_string(dir.path().join(RUN_LOG)).unwrap();
        assert!(log.contains("boom"));
    }

    #[tokio::test]
    async fn test_command_runner_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(vec!["/nonexistent/simulator".into()]).unwrap();
        assert!(runner.run("j", dir.path()).await.is_err());
    }
}
