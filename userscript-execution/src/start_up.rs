//! Scripts executed when the engine starts

use crate::library::ScriptLibrary;
use crate::manager::ScriptTaskManager;
use futures::future::join_all;
use tracing::{info, warn};
use userscript_core::{ExecutionTask, Result};

/// What happened to each configured start-up script
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StartUpReport {
    /// Tasks left with pending cleanup, now mounted
    pub mounted: Vec<ExecutionTask>,
    /// Scripts that ran to completion without leaving anything behind
    pub finished: Vec<String>,
    pub failed: Vec<String>,
}

enum StartUpOutcome {
    Mounted(ExecutionTask),
    Finished,
    Failed,
}

impl ScriptTaskManager {
    /// Execute every script listed in `start_up.scripts` with its default
    /// arguments and mount the ones that leave a cleanup behind.
    ///
    /// Scripts run concurrently. Failures are routed to the error reporter
    /// and do not affect the other scripts.
    pub async fn run_start_up_scripts(&self, library: &ScriptLibrary) -> StartUpReport {
        let config = self.context().config.configs().start_up;
        let mut report = StartUpReport::default();
        if !config.enabled || config.scripts.is_empty() {
            return report;
        }

        info!(count = config.scripts.len(), "Running start-up scripts");
        let runs = config.scripts.iter().map(|name| self.start_up_script(library, name));
        let outcomes = join_all(runs).await;

        for (name, outcome) in config.scripts.into_iter().zip(outcomes) {
            match outcome {
                Ok(StartUpOutcome::Mounted(task)) => report.mounted.push(task),
                Ok(StartUpOutcome::Finished) => report.finished.push(name),
                Ok(StartUpOutcome::Failed) => report.failed.push(name),
                Err(e) => {
                    warn!(script = %name, "Start-up script could not be started: {}", e);
                    self.context()
                        .reporter
                        .report(&e, &format!("Start-up script '{}'", name));
                    report.failed.push(name);
                }
            }
        }
        report
    }

    async fn start_up_script(&self, library: &ScriptLibrary, name: &str) -> Result<StartUpOutcome> {
        let script = library.get_script(name).await?;
        let (task, termination) = self
            .execute_and_wait(&script, script.default_arguments())
            .await?;

        // Run failures were already reported when the task terminated
        if termination.has_error {
            return Ok(StartUpOutcome::Failed);
        }
        if termination.has_clean_up {
            self.mount_task(&task.task_id).await;
            return Ok(StartUpOutcome::Mounted(task));
        }
        Ok(StartUpOutcome::Finished)
    }
}
