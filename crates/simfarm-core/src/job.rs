use crate::{JobError, Result, Simulation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a job
pub type JobId = Uuid;

/// Path-derived job name, used as the log key for the job's whole lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobName(String);

impl JobName {
    pub fn from_path(path: &Path) -> Self {
        let raw = path.to_string_lossy();
        let trimmed = raw.trim_end_matches(['/', '\\']);
        if trimmed.is_empty() {
            JobName(raw.into_owned())
        } else {
            JobName(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path component, suitable as a directory or file stem.
    pub fn stem(&self) -> &str {
        self.0
            .rsplit(['/', '\\'])
            .find(|part| !part.is_empty())
            .unwrap_or("job")
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobName {
    fn from(value: &str) -> Self {
        JobName::from_path(Path::new(value))
    }
}

/// Job phase as driven by the dispatch engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPhase {
    /// Waiting in the arrival queue
    Submitted,
    /// Passed triage, waiting in the dispatch queue
    Accepted,
    /// Failed triage; terminal
    Rejected,
    /// Paired with a worker and being executed
    Dispatched,
    /// Executed and analysed successfully; terminal
    Completed,
    /// Failed after dispatch; terminal
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Submitted => "submitted",
            JobPhase::Accepted => "accepted",
            JobPhase::Rejected => "rejected",
            JobPhase::Dispatched => "dispatched",
            JobPhase::Completed => "completed",
            JobPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Rejected | JobPhase::Completed | JobPhase::Failed
        )
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulation unit of work
pub struct Job {
    /// Unique job identifier
    pub id: JobId,

    /// Name derived from the source directory
    pub name: JobName,

    /// Current phase
    pub phase: JobPhase,

    /// When the job was submitted
    pub submitted_at: DateTime<Utc>,

    /// Last phase change
    pub updated_at: DateTime<Utc>,

    /// Syntax errors found during triage
    pub syntax_errors: usize,

    /// Name of the worker the job was dispatched to
    pub worker: Option<String>,

    /// Failure message (if failed)
    pub error: Option<String>,

    simulation: Arc<dyn Simulation>,
}

impl Job {
    pub fn new(simulation: Arc<dyn Simulation>) -> Self {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            name: JobName::from_path(simulation.source_dir()),
            phase: JobPhase::Submitted,
            submitted_at: now,
            updated_at: now,
            syntax_errors: 0,
            worker: None,
            error: None,
            simulation,
        }
    }

    pub fn simulation(&self) -> &dyn Simulation {
        self.simulation.as_ref()
    }

    /// Record the triage verdict. Zero errors accepts the job.
    pub fn mark_triaged(&mut self, error_count: usize) -> Result<()> {
        self.expect_phase(JobPhase::Submitted)?;
        self.syntax_errors = error_count;
        self.set_phase(if error_count == 0 {
            JobPhase::Accepted
        } else {
            JobPhase::Rejected
        });
        Ok(())
    }

    pub fn mark_dispatched(&mut self, worker: &str) -> Result<()> {
        self.expect_phase(JobPhase::Accepted)?;
        self.worker = Some(worker.to_string());
        self.set_phase(JobPhase::Dispatched);
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<()> {
        self.expect_phase(JobPhase::Dispatched)?;
        self.set_phase(JobPhase::Completed);
        Ok(())
    }

    pub fn mark_failed(&mut self, error: String) -> Result<()> {
        self.expect_phase(JobPhase::Dispatched)?;
        self.error = Some(error);
        self.set_phase(JobPhase::Failed);
        Ok(())
    }

    /// Path of a new, timestamped result directory for this job.
    ///
    /// The directory itself is not created here.
    pub fn fresh_result_dir(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S%.3f");
        self.simulation
            .result_root()
            .join(format!("{}-{}", self.name.stem(), stamp))
    }

    fn expect_phase(&self, expected: JobPhase) -> Result<()> {
        if self.phase != expected {
            return Err(JobError::InvalidPhase {
                expected: expected.to_string(),
                actual: self.phase.to_string(),
            });
        }
        Ok(())
    }

    fn set_phase(&mut self, phase: JobPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("submitted_at", &self.submitted_at)
            .field("worker", &self.worker)
            .finish()
    }
}
