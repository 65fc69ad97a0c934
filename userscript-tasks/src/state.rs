use serde::{Deserialize, Serialize};
use userscript_core::TaskId;

/// Lifecycle of a tracked task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TaskState {
    /// Registered, the factory has not reported a handle yet
    Pending = 0,
    /// The underlying work has started
    Running = 1,
    /// Killed; waiters are rejected with the kill reason
    Aborted = 2,
    /// Settled through the settler
    Done = 3,
}

impl TaskState {
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }
}

/// Point-in-time view of a tracked task
#[derive(Debug, Clone)]
pub struct TaskSnapshot<D> {
    pub task_id: TaskId,
    pub state: TaskState,
    pub data: Option<D>,
}
