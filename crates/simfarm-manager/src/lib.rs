pub mod acceptor;
pub mod api;
pub mod config;
pub mod deque;
pub mod dispatch;
pub mod error;
pub mod execution;
pub mod heartbeat;
pub mod loops;
pub mod manager;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod triage;
pub mod worker;

pub use config::ManagerConfig;
pub use error::DispatchError;
pub use loops::{LoopRegistry, LoopState};
pub use manager::{Manager, ManagerStats};
pub use queue::DispatchOrder;
