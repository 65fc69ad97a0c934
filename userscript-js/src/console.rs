//! Console output of sandboxed scripts

use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use userscript_core::{EventChannel, LogLevel, TaskConsoleOutput, TaskEvent, TaskId};
use userscript_interfaces::HostApi;

/// Tracing target console calls are re-emitted under
pub const CONSOLE_TARGET: &str = "userscript::console";

/// Receives every console call made by a sandboxed script.
///
/// Called synchronously on the sandbox thread, in call order.
pub trait ConsoleSink: Send + Sync {
    fn write(&self, task_id: &TaskId, output: TaskConsoleOutput);
}

/// Publishes console output as `task` events, mirrors it to the host output
/// channel and re-emits it through `tracing`
pub struct EventConsoleSink {
    events: EventChannel,
    host: Option<Arc<dyn HostApi>>,
}

impl EventConsoleSink {
    pub fn new(events: EventChannel) -> Self {
        Self { events, host: None }
    }

    pub fn with_host(mut self, host: Arc<dyn HostApi>) -> Self {
        self.host = Some(host);
        self
    }
}

impl ConsoleSink for EventConsoleSink {
    fn write(&self, task_id: &TaskId, output: TaskConsoleOutput) {
        let text = output.text();
        let level = output.level;

        self.events.emit_task(TaskEvent::Output {
            task_id: task_id.clone(),
            output,
        });

        if let Some(host) = &self.host {
            host.append_output(&format!("[{}] [{}] {}", task_id, level, text));
        }

        match level {
            LogLevel::Trace => trace!(target: CONSOLE_TARGET, %task_id, "{}", text),
            LogLevel::Debug => debug!(target: CONSOLE_TARGET, %task_id, "{}", text),
            LogLevel::Log | LogLevel::Info => info!(target: CONSOLE_TARGET, %task_id, "{}", text),
            LogLevel::Warn => warn!(target: CONSOLE_TARGET, %task_id, "{}", text),
            LogLevel::Error => error!(target: CONSOLE_TARGET, %task_id, "{}", text),
        }
    }
}
