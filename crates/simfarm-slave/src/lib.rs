pub mod config;
pub mod error;
pub mod runner;
pub mod slave;

pub use config::SlaveConfig;
pub use error::SlaveError;
pub use runner::{CommandRunner, EchoRunner, JobRunner};
pub use slave::Slave;
