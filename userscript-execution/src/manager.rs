//! Script execution task manager
//!
//! Per task: running, then terminated. A task whose script handed back a
//! cleanup function stays in the active set after terminating until it is
//! cleaned up; mounted tasks are additionally skipped by bulk cleanup unless
//! asked otherwise. Every other task is dropped as soon as it terminates.

use futures::future::join_all;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use userscript_core::{
    allocate_task_id, wait_for_termination, EngineError, EventChannel, ExecutionTask, Result,
    TaskEvent, TaskId, TaskTermination, UserScript,
};
use userscript_interfaces::{
    ConfigProvider, ErrorReporter, GlobalStatesPatch, HostApi, PackageRoots, ScriptStorage,
};
use userscript_js::{CleanupHandle, ModuleResolver, RunOutcome, RunRequest, Sandbox, ScriptRun};

/// Collaborators of a [`ScriptTaskManager`].
///
/// `events` must be the channel the sandbox's console sink publishes to, so
/// that output and termination of a task reach the same subscribers.
pub struct ManagerContext {
    pub sandbox: Sandbox,
    pub storage: Arc<dyn ScriptStorage>,
    pub config: Arc<dyn ConfigProvider>,
    pub host: Arc<dyn HostApi>,
    pub roots: Arc<dyn PackageRoots>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub events: EventChannel,
}

struct TaskEntry {
    info: ExecutionTask,
    running: bool,
    mount: bool,
    cleaning: bool,
    clean_up: Option<CleanupHandle>,
    required_paths: Vec<PathBuf>,
}

impl TaskEntry {
    fn new(info: ExecutionTask) -> Self {
        Self {
            info,
            running: true,
            mount: false,
            cleaning: false,
            clean_up: None,
            required_paths: Vec::new(),
        }
    }
}

struct Inner {
    context: ManagerContext,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
}

/// Runs scripts as tracked tasks
#[derive(Clone)]
pub struct ScriptTaskManager {
    inner: Arc<Inner>,
}

impl ScriptTaskManager {
    pub fn new(context: ManagerContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn context(&self) -> &ManagerContext {
        &self.inner.context
    }

    pub fn events(&self) -> &EventChannel {
        &self.inner.context.events
    }

    /// Start running `script` with `params` merged over its argument
    /// defaults.
    ///
    /// Returns as soon as the run has been handed to the sandbox; progress is
    /// published on the event channel. Failures of the run itself go to the
    /// error reporter and end in a `terminate` event with `hasError` set.
    pub async fn execute(&self, script: &UserScript, params: JsonValue) -> Result<ExecutionTask> {
        let args = script.resolve_arguments(&params)?;
        let context = &self.inner.context;

        context
            .storage
            .update_global_state(GlobalStatesPatch {
                last_executed_script: Some(script.name.clone()),
            })
            .await?;

        let host_module_id = context.config.configs().script.host_module;
        let resolver = ModuleResolver::new(context.roots.module_roots().await);

        let task = {
            let mut tasks = self.inner.tasks.lock().await;
            let task_id = allocate_task_id(&mut rand::rng(), |candidate| tasks.contains_key(candidate));
            let task = ExecutionTask::new(task_id.clone(), script.name.clone());
            tasks.insert(task_id, TaskEntry::new(task.clone()));
            task
        };

        let request = RunRequest {
            task_id: task.task_id.clone(),
            script: script.clone(),
            script_dir: context.storage.based_on_scripts(&[&script.name]),
            args,
            host_module_id,
            resolver,
        };

        info!(task_id = %task.task_id, script = %script.name, "Executing script");
        let manager = self.clone();
        tokio::spawn(async move {
            let task_id = request.task_id.clone();
            let script_name = request.script.name.clone();
            let run = manager.inner.context.sandbox.run_script(request).await;
            manager.complete(&task_id, &script_name, run).await;
        });

        Ok(task)
    }

    /// [`execute`](Self::execute) and wait for the task's `terminate` event
    pub async fn execute_and_wait(
        &self,
        script: &UserScript,
        params: JsonValue,
    ) -> Result<(ExecutionTask, TaskTermination)> {
        // Subscribe first so a fast script cannot terminate unobserved
        let mut rx = self.events().subscribe();
        let task = self.execute(script, params).await?;
        let termination = wait_for_termination(&mut rx, &task.task_id)
            .await
            .ok_or_else(|| {
                EngineError::internal(format!(
                    "Event channel closed before task {} terminated",
                    task.task_id
                ))
            })?;
        Ok((task, termination))
    }

    async fn complete(&self, task_id: &TaskId, script_name: &str, run: Result<ScriptRun>) {
        let (outcome, required_paths) = match run {
            Ok(run) => (run.outcome, run.required_paths),
            Err(e) => (RunOutcome::Failed(e), Vec::new()),
        };

        let reporter = &self.inner.context.reporter;
        let origin = format!("Script '{}' (task {})", script_name, task_id);
        if let RunOutcome::Failed(e) = &outcome {
            reporter.report(e, &origin);
        }
        if let Err(e) = self.finish_task(task_id, outcome, required_paths).await {
            reporter.report(&e, &origin);
        }
    }

    /// Record how a run ended and publish its `terminate` event.
    ///
    /// No-op unless the task exists and is still running, so a duplicate
    /// completion never produces a second event. A returned value that is
    /// none of the sanctioned shapes terminates the task with `hasError` set
    /// and is returned as an invalid-usage error; a failed run is not held to
    /// that rule.
    pub async fn finish_task(
        &self,
        task_id: &TaskId,
        outcome: RunOutcome,
        required_paths: Vec<PathBuf>,
    ) -> Result<()> {
        let mut tasks = self.inner.tasks.lock().await;
        let Some(entry) = tasks.get_mut(task_id) else {
            debug!(%task_id, "Ignoring completion of unknown task");
            return Ok(());
        };
        if !entry.running {
            debug!(%task_id, "Ignoring duplicate completion");
            return Ok(());
        }
        entry.running = false;
        entry.required_paths = required_paths;

        let (result, clean_up, has_error, failure) = match outcome {
            RunOutcome::Returned(result) => {
                let (custom, clean_up) = result.into_parts();
                (custom, clean_up, false, None)
            }
            RunOutcome::Unrecognized(unrecognized) => {
                let err = EngineError::invalid_usage(format!(
                    "Script '{}' (task {}): {}",
                    entry.info.task_name, task_id, unrecognized
                ));
                (None, None, true, Some(err))
            }
            RunOutcome::Failed(_) => (None, None, true, None),
        };

        let has_clean_up = clean_up.is_some();
        entry.clean_up = clean_up;

        let mut eviction = Ok(());
        if !has_clean_up {
            if let Some(entry) = tasks.remove(task_id) {
                eviction = self.evict(&entry.required_paths);
            }
        }
        drop(tasks);

        self.events().emit_task(TaskEvent::Terminate(TaskTermination {
            task_id: task_id.clone(),
            result,
            has_clean_up,
            has_error,
        }));
        info!(%task_id, has_clean_up, has_error, "Task terminated");

        match failure {
            Some(err) => Err(err),
            None => eviction,
        }
    }

    fn evict(&self, paths: &[PathBuf]) -> Result<()> {
        self.inner.context.sandbox.module_cache().evict_all(paths)
    }

    /// Exclude a terminated task from bulk cleanup. Returns whether the task
    /// exists.
    pub async fn mount_task(&self, task_id: &TaskId) -> bool {
        match self.inner.tasks.lock().await.get_mut(task_id) {
            Some(entry) => {
                entry.mount = true;
                info!(%task_id, "Task mounted");
                true
            }
            None => false,
        }
    }

    /// Run the task's cleanup function, evict the modules its run loaded and
    /// drop the task.
    ///
    /// Unknown and still running tasks are rejected without touching the
    /// active set. A failing cleanup function still drops the task; its error
    /// is returned afterwards.
    pub async fn clean_up(&self, task_id: &TaskId) -> Result<()> {
        let (clean_up, required_paths) = {
            let mut tasks = self.inner.tasks.lock().await;
            let entry = tasks
                .get_mut(task_id)
                .ok_or_else(|| EngineError::invalid_usage(format!("Task {} not found", task_id)))?;
            if entry.running {
                return Err(EngineError::invalid_usage(format!(
                    "Task {} is still running and cannot be cleaned up",
                    task_id
                )));
            }
            if entry.cleaning {
                return Err(EngineError::invalid_usage(format!(
                    "Task {} is already being cleaned up",
                    task_id
                )));
            }
            entry.cleaning = true;
            (entry.clean_up.take(), std::mem::take(&mut entry.required_paths))
        };

        let result = match clean_up {
            Some(handle) => handle.invoke().await,
            None => Ok(()),
        };
        let eviction = self.evict(&required_paths);
        self.inner.tasks.lock().await.remove(task_id);

        match &result {
            Ok(()) => info!(%task_id, "Task cleaned up"),
            Err(e) => warn!(%task_id, "Task removed after failed cleanup: {}", e),
        }
        result.and(eviction)
    }

    /// Clean up every terminated task, skipping mounted ones unless
    /// `include_mounted` is set. Individual failures are logged and do not
    /// stop the others. Returns how many cleanups succeeded.
    pub async fn clean_up_all(&self, include_mounted: bool) -> usize {
        let eligible: Vec<TaskId> = self
            .inner
            .tasks
            .lock()
            .await
            .iter()
            .filter(|(_, entry)| !entry.running && !entry.cleaning && (include_mounted || !entry.mount))
            .map(|(task_id, _)| task_id.clone())
            .collect();

        let results = join_all(eligible.iter().map(|task_id| self.clean_up(task_id))).await;
        let mut cleaned = 0;
        for (task_id, result) in eligible.iter().zip(results) {
            match result {
                Ok(()) => cleaned += 1,
                Err(e) => warn!(%task_id, "Cleanup failed: {}", e),
            }
        }
        debug!(cleaned, eligible = eligible.len(), "Bulk cleanup finished");
        cleaned
    }

    /// Active tasks, oldest first
    pub async fn get_tasks(&self) -> Vec<ExecutionTask> {
        let mut tasks: Vec<ExecutionTask> = self
            .inner
            .tasks
            .lock()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        tasks.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        tasks
    }

    pub async fn get_last_executed_script_name(&self) -> Result<Option<String>> {
        Ok(self
            .inner
            .context
            .storage
            .global_states()
            .await?
            .last_executed_script)
    }
}
