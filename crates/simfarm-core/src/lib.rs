mod error;
mod job;
mod simulation;

pub mod archive;
pub mod directory;
pub mod notify;
pub mod syntax;

pub use directory::DirectorySimulation;
pub use error::{JobError, Result};
pub use job::{Job, JobId, JobName, JobPhase};
pub use notify::{ChannelNotifier, JobEvent, JobEventKind, Notifier, TracingNotifier};
pub use simulation::Simulation;
pub use syntax::{SyntaxError, SyntaxReport};
