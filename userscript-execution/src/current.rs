//! Running the script open in the editor

use crate::library::{load_meta, META_FILE_NAME};
use crate::manager::ScriptTaskManager;
use tracing::info;
use userscript_config::AfterRunAction;
use userscript_core::{EngineError, ExecutionTask, Result, TaskId, TaskTermination, UserScript};

const AFTER_RUN_OPTIONS: [&str; 3] = ["Clean up", "Mount", "Keep"];

/// Outcome of [`ScriptTaskManager::execute_current`]
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentRun {
    pub task: ExecutionTask,
    pub termination: TaskTermination,
    /// What was done with the task's pending cleanup, if it left one
    pub action: Option<AfterRunAction>,
}

impl ScriptTaskManager {
    /// Run the script whose source is open in the editor with its default
    /// arguments, then clean up, mount or keep the task according to
    /// `script.after_current_run`
    pub async fn execute_current(&self) -> Result<CurrentRun> {
        let host = &self.context().host;
        let document = host
            .active_document()
            .ok_or_else(|| EngineError::invalid_usage("No script is open in the editor"))?;
        let meta_path = document
            .parent()
            .map(|dir| dir.join(META_FILE_NAME))
            .ok_or_else(|| EngineError::invalid_usage("The open document is not part of a script"))?;

        let script = load_meta(host.as_ref(), &meta_path).await.map_err(|e| match e {
            EngineError::Io(_) => EngineError::invalid_usage(format!(
                "'{}' is not part of a script: no {} next to it",
                document.display(),
                META_FILE_NAME
            )),
            other => other,
        })?;

        let (task, termination) = self
            .execute_and_wait(&script, script.default_arguments())
            .await?;

        let action = if termination.has_clean_up {
            Some(self.after_current_run(&script, &task.task_id).await?)
        } else {
            None
        };

        Ok(CurrentRun {
            task,
            termination,
            action,
        })
    }

    async fn after_current_run(&self, script: &UserScript, task_id: &TaskId) -> Result<AfterRunAction> {
        let action = match self.context().config.configs().script.after_current_run {
            AfterRunAction::Prompt => {
                let options: Vec<String> = AFTER_RUN_OPTIONS.iter().map(|option| option.to_string()).collect();
                let message = format!(
                    "Script '{}' left resources behind. What should happen to them?",
                    script.name
                );
                match self.context().host.pick(&message, &options).await? {
                    Some(0) => AfterRunAction::CleanUp,
                    Some(1) => AfterRunAction::Mount,
                    _ => AfterRunAction::Keep,
                }
            }
            configured => configured,
        };

        match action {
            AfterRunAction::CleanUp => self.clean_up(task_id).await?,
            AfterRunAction::Mount => {
                self.mount_task(task_id).await;
            }
            AfterRunAction::Prompt | AfterRunAction::Keep => {}
        }
        info!(%task_id, script = %script.name, ?action, "Handled pending cleanup of current script");
        Ok(action)
    }
}
