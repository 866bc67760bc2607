use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

pub const ACCEPTOR: &str = "acceptor";
pub const TRIAGE: &str = "triage";
pub const DISPATCH: &str = "dispatch";
pub const HEARTBEAT: &str = "heartbeat";

/// Lifecycle of one long-running loop. Loops are never restarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LoopState {
    NotStarted,
    Running,
    /// Stopped on request
    Stopped,
    /// Stopped by a fatal error
    Failed(String),
}

/// Shared view of which loops are still alive
pub struct LoopRegistry {
    states: RwLock<BTreeMap<&'static str, LoopState>>,
}

impl LoopRegistry {
    pub fn new() -> Self {
        let states = [ACCEPTOR, TRIAGE, DISPATCH, HEARTBEAT]
            .into_iter()
            .map(|name| (name, LoopState::NotStarted))
            .collect();
        LoopRegistry {
            states: RwLock::new(states),
        }
    }

    pub fn set(&self, name: &'static str, state: LoopState) {
        self.states.write().insert(name, state);
    }

    pub fn get(&self, name: &str) -> Option<LoopState> {
        self.states.read().get(name).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, LoopState> {
        self.states.read().clone()
    }

    /// True when every started loop is still running
    pub fn all_running(&self) -> bool {
        self.states
            .read()
            .values()
            .all(|s| matches!(s, LoopState::Running | LoopState::NotStarted))
    }
}

impl Default for LoopRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_when_a_loop_fails() {
        let loops = LoopRegistry::new();
        assert_eq!(loops.get(TRIAGE), Some(LoopState::NotStarted));
        loops.set(TRIAGE, LoopState::Running);
        assert!(loops.all_running());

        loops.set(ACCEPTOR, LoopState::Failed("accept failed".to_string()));
        assert!(!loops.all_running());

        let json = serde_json::to_value(loops.snapshot()).unwrap();
        assert_eq!(json["acceptor"]["state"], "failed");
        assert_eq!(json["acceptor"]["reason"], "accept failed");
        assert_eq!(json["triage"]["state"], "running");
    }
}
