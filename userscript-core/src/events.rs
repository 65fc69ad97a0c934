//! Event/output channel
//!
//! Task lifecycle and console output events are fanned out to every
//! subscriber through a broadcast channel. Events for one task are delivered
//! in the order they were emitted.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Maximum number of events buffered per subscriber
const EVENT_BUFFER_SIZE: usize = 1024;

/// Console severities a script may log with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Log,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Log,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Log => "log",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| format!("Unknown console level: {}", s))
    }
}

/// One console call captured from a sandboxed script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConsoleOutput {
    pub level: LogLevel,
    pub payload: Vec<JsonValue>,
}

impl TaskConsoleOutput {
    /// Space-separated text form, as written to the host log channel
    pub fn text(&self) -> String {
        self.payload
            .iter()
            .map(|value| match value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Termination report of a script task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTermination {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    pub has_clean_up: bool,
    #[serde(default)]
    pub has_error: bool,
}

/// Payload of the `task` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskEvent {
    Output {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        output: TaskConsoleOutput,
    },
    Terminate(TaskTermination),
}

impl TaskEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::Output { task_id, .. } => task_id,
            TaskEvent::Terminate(termination) => &termination.task_id,
        }
    }
}

/// Every event the engine publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "data", rename_all = "kebab-case")]
pub enum EngineEvent {
    Task(TaskEvent),
    ScriptListUpdate,
}

impl EngineEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            EngineEvent::Task(_) => "task",
            EngineEvent::ScriptListUpdate => "script-list-update",
        }
    }
}

/// Typed pub/sub dispatcher for engine events
#[derive(Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    /// Publish an event to every current subscriber
    pub fn emit(&self, event: EngineEvent) {
        let topic = event.topic();
        match self.tx.send(event) {
            Ok(subscriber_count) => {
                debug!("Broadcasted {} event to {} subscribers", topic, subscriber_count);
            }
            Err(_) => {
                debug!("No subscribers for {} events", topic);
            }
        }
    }

    pub fn emit_task(&self, event: TaskEvent) {
        self.emit(EngineEvent::Task(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait on `rx` until the given task terminates.
///
/// Returns `None` when the channel closes first.
pub async fn wait_for_termination(
    rx: &mut broadcast::Receiver<EngineEvent>,
    task_id: &TaskId,
) -> Option<TaskTermination> {
    loop {
        match rx.recv().await {
            Ok(EngineEvent::Task(TaskEvent::Terminate(termination)))
                if &termination.task_id == task_id =>
            {
                return Some(termination)
            }
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event subscription lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
