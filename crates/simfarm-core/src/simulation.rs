use crate::{Result, SyntaxReport};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// The job-specific collaborators the dispatch engine drives.
///
/// Everything behind this trait (compiling, packaging, analysing results,
/// talking to the submitter) is opaque to the engine. It only observes the
/// outcome of each call.
#[async_trait]
pub trait Simulation: Send + Sync {
    /// Directory holding the simulation sources. The job name derives from it.
    fn source_dir(&self) -> &Path;

    /// Parent directory under which fresh result directories are created.
    fn result_root(&self) -> &Path;

    /// Lightweight pre-check run during triage.
    async fn check_syntax(&self) -> SyntaxReport;

    /// Tell the submitter the job is about to be executed.
    fn notify_beginning(&self);

    /// Tell the submitter the job is finished, whatever the outcome.
    fn notify_completion(&self);

    /// Assemble the job inputs into an archive and return its path.
    async fn package(&self) -> Result<PathBuf>;

    /// Analyse the unpacked results in `result_dir`.
    async fn analyze(&self, result_dir: &Path) -> Result<()>;
}
