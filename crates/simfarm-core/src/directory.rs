//! Default [`Simulation`] backed by a plain source directory.

use crate::archive::{list_files, pack_dir};
use crate::syntax::parse_compiler_output;
use crate::{
    JobError, JobEvent, JobEventKind, JobName, Notifier, Result, Simulation, SyntaxError,
    SyntaxReport,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

pub const SUMMARY_FILE: &str = "summary.json";

pub struct DirectorySimulation {
    name: JobName,
    source_dir: PathBuf,
    result_root: PathBuf,
    precheck_command: Vec<String>,
    notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Serialize)]
struct ResultSummary<'a> {
    job: &'a str,
    files: Vec<SummaryFile>,
    total_bytes: u64,
    analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct SummaryFile {
    path: String,
    bytes: u64,
}

impl DirectorySimulation {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        result_root: impl Into<PathBuf>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let source_dir = source_dir.into();
        DirectorySimulation {
            name: JobName::from_path(&source_dir),
            source_dir,
            result_root: result_root.into(),
            precheck_command: Vec::new(),
            notifier,
        }
    }

    /// Command (argv) run inside the source directory during triage.
    /// Its output is scanned for `file:line: error:` diagnostics.
    pub fn with_precheck(mut self, command: Vec<String>) -> Self {
        self.precheck_command = command;
        self
    }

    async fn run_precheck(&self, program: &str, args: &[String]) -> SyntaxReport {
        let output = match Command::new(program)
            .args(args)
            .current_dir(&self.source_dir)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(job = %self.name, "Pre-check command could not run: {}", e);
                return SyntaxReport::new(vec![SyntaxError::new(format!(
                    "pre-check command {} could not run: {}",
                    program, e
                ))]);
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let mut errors = parse_compiler_output(&text);
        if errors.is_empty() && !output.status.success() {
            errors.push(SyntaxError::new(format!(
                "pre-check exited with {}",
                output.status
            )));
        }
        SyntaxReport::new(errors)
    }
}

#[async_trait]
impl Simulation for DirectorySimulation {
    fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    fn result_root(&self) -> &Path {
        &self.result_root
    }

    async fn check_syntax(&self) -> SyntaxReport {
        match self.precheck_command.split_first() {
            Some((program, args)) => self.run_precheck(program, args).await,
            None => SyntaxReport::default(),
        }
    }

    fn notify_beginning(&self) {
        self.notifier
            .notify(JobEvent::new(self.name.clone(), JobEventKind::Beginning));
    }

    fn notify_completion(&self) {
        self.notifier
            .notify(JobEvent::new(self.name.clone(), JobEventKind::Completion));
    }

    async fn package(&self) -> Result<PathBuf> {
        let src = self.source_dir.clone();
        let dest = std::env::temp_dir().join(format!(
            "simfarm-{}-{}.bundle",
            self.name.stem(),
            Uuid::new_v4().simple()
        ));
        debug!(job = %self.name, "Packaging {} into {}", src.display(), dest.display());

        tokio::task::spawn_blocking(move || pack_dir(&src, &dest))
            .await
            .map_err(|e| JobError::Packaging(e.to_string()))?
    }

    async fn analyze(&self, result_dir: &Path) -> Result<()> {
        let dir = result_dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || list_files(&dir))
            .await
            .map_err(|e| JobError::Analysis(e.to_string()))??;

        if files.is_empty() {
            return Err(JobError::Analysis(format!(
                "no result files in {}",
                result_dir.display()
            )));
        }

        let summary = ResultSummary {
            job: self.name.as_str(),
            total_bytes: files.iter().map(|(_, bytes)| bytes).sum(),
            files: files
                .into_iter()
                .map(|(path, bytes)| SummaryFile { path, bytes })
                .collect(),
            analyzed_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&summary)
            .map_err(|e| JobError::Analysis(e.to_string()))?;
        tokio::fs::write(result_dir.join(SUMMARY_FILE), json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelNotifier;
    use tempfile::TempDir;

    fn simulation(source: &Path, results: &Path) -> (DirectorySimulation, tokio::sync::mpsc::UnboundedReceiver<JobEvent>) {
        let (notifier, rx) = ChannelNotifier::channel();
        (DirectorySimulation::new(source, results, Arc::new(notifier)), rx)
    }

    #[tokio::test]
    async fn test_no_precheck_is_clean() {
        let src = TempDir::new().unwrap();
        let (sim, _rx) = simulation(src.path(), src.path());
        assert!(sim.check_syntax().await.is_clean());
    }

    #[tokio::test]
    async fn test_precheck_counts_unique_errors() {
        let src = TempDir::new().unwrap();
        let (sim, _rx) = simulation(src.path(), src.path());
        let sim = sim.with_precheck(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo 'm.c:1: error: x'; echo 'm.c:1: error: x' >&2; echo 'm.c:9: error: y'; exit 1"
                .to_string(),
        ]);
        assert_eq!(sim.check_syntax().await.error_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_precheck_program_is_an_error() {
        let src = TempDir::new().unwrap();
        let (sim, _rx) = simulation(src.path(), src.path());
        let sim = sim.with_precheck(vec!["/definitely/not/a/compiler".to_string()]);
        assert_eq!(sim.check_syntax().await.error_count(), 1);
    }

    #[tokio::test]
    async fn test_package_and_analyze() {
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("model.cfg"), b"n=1").unwrap();
        let results = TempDir::new().unwrap();
        let (sim, _rx) = simulation(src.path(), results.path());

        let archive = sim.package().await.unwrap();
        assert!(archive.exists());
        std::fs::remove_file(archive).unwrap();

        let empty = results.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        assert!(matches!(sim.analyze(&empty).await, Err(JobError::Analysis(_))));

        let full = results.path().join("full");
        std::fs::create_dir(&full).unwrap();
        std::fs::write(full.join("out.csv"), b"t,v\n0,1\n").unwrap();
        sim.analyze(&full).await.unwrap();

        let summary: serde_json::Value =
            serde_json::from_slice(&std::fs::read(full.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(summary["total_bytes"], 8);
        assert_eq!(summary["files"][0]["path"], "out.csv");
    }

    #[test]
    fn test_notifications_carry_job_name() {
        let (sim, mut rx) = simulation(Path::new("/sims/orbit"), Path::new("/tmp"));
        sim.notify_beginning();
        sim.notify_completion();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.job.as_str(), "/sims/orbit");
        assert_eq!(first.kind, JobEventKind::Beginning);
        assert_eq!(rx.try_recv().unwrap().kind, JobEventKind::Completion);
    }
}
