//! Task identifiers and the public projection of an execution task

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Number of characters in a generated task id
pub const TASK_ID_LEN: usize = 8;

/// Opaque identifier of a tracked task
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let id: String = rng
            .sample_iter(&Alphanumeric)
            .take(TASK_ID_LEN)
            .map(char::from)
            .collect();
        TaskId(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        TaskId(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        TaskId(value)
    }
}

/// Draw task ids from `rng` until one is not taken.
///
/// `is_taken` is consulted with the id set of the caller's active tasks; the
/// loop keeps re-sampling so a collision never leaks out.
pub fn allocate_task_id<R, F>(rng: &mut R, is_taken: F) -> TaskId
where
    R: Rng + ?Sized,
    F: Fn(&str) -> bool,
{
    loop {
        let candidate = TaskId::sample(rng);
        if !is_taken(candidate.as_str()) {
            return candidate;
        }
        tracing::trace!(task_id = %candidate, "Task id collision, re-sampling");
    }
}

/// Snapshot of a running or retained script execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTask {
    pub task_id: TaskId,
    pub task_name: String,
    pub start_time: DateTime<Utc>,
}

impl ExecutionTask {
    pub fn new(task_id: TaskId, task_name: impl Into<String>) -> Self {
        Self {
            task_id,
            task_name: task_name.into(),
            start_time: Utc::now(),
        }
    }
}
