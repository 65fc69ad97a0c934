//! Dedicated thread owning one sandbox context

use crate::error::SandboxError;
use crate::result::{classify, CleanupHandle, CleanupRequest, RunOutcome, ScriptRun};
use crate::runtime::{required_paths, DriverOutcome, SandboxRuntime, SandboxState};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use userscript_core::{EngineError, Result, TaskId};

/// Compiled script ready to be started on a sandbox thread
pub(crate) struct SandboxJob {
    pub(crate) state: SandboxState,
    pub(crate) host_module_id: String,
    pub(crate) script_name: String,
    pub(crate) filename: PathBuf,
    pub(crate) code: String,
    pub(crate) args: JsonValue,
    pub(crate) host_context: JsonValue,
}

/// Start `job` on its own thread.
///
/// Boa contexts cannot leave the thread that created them, so the context
/// lives and dies with this thread. The thread stays alive after `main`
/// settles only when a cleanup function was captured, and exits once that
/// cleanup has run or its handle is dropped.
pub(crate) fn spawn(job: SandboxJob) -> Result<oneshot::Receiver<ScriptRun>> {
    let (result_tx, result_rx) = oneshot::channel();
    let task_id = job.state.task_id.clone();

    thread::Builder::new()
        .name(format!("userscript-{}", task_id))
        .spawn(move || run_job(job, result_tx))
        .map_err(|e| EngineError::internal(format!("Failed to start sandbox thread for task {}: {}", task_id, e)))?;

    Ok(result_rx)
}

fn run_job(job: SandboxJob, result_tx: oneshot::Sender<ScriptRun>) {
    let task_id = job.state.task_id.clone();
    let script_name = job.script_name.clone();
    let (cleanup_tx, cleanup_rx) = mpsc::channel::<CleanupRequest>();

    let mut runtime = match SandboxRuntime::new(job.state, &job.host_module_id) {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = result_tx.send(ScriptRun::failed(e.into()));
            return;
        }
    };

    let started = runtime.start(&job.code, &job.filename, &job.args, &job.host_context);
    let mut keep_alive = false;
    let outcome = match started {
        Ok(Some(DriverOutcome::Done { shape })) => {
            match classify(shape, || CleanupHandle::new(task_id.clone(), cleanup_tx)) {
                Ok(result) => {
                    keep_alive = result.has_clean_up();
                    RunOutcome::Returned(result)
                }
                Err(unrecognized) => RunOutcome::Unrecognized(unrecognized),
            }
        }
        Ok(Some(DriverOutcome::Evaluate { error })) => RunOutcome::Failed(error.into_error(&script_name, true).into()),
        Ok(Some(DriverOutcome::Run { error })) => RunOutcome::Failed(error.into_error(&script_name, false).into()),
        Ok(Some(DriverOutcome::Main)) => RunOutcome::Failed(SandboxError::MissingMain(script_name.clone()).into()),
        Ok(Some(other)) => RunOutcome::Failed(EngineError::internal(format!(
            "Unexpected driver outcome after start: {:?}",
            other
        ))),
        Ok(None) => RunOutcome::Failed(SandboxError::NeverSettled(script_name.clone()).into()),
        Err(e) => RunOutcome::Failed(e.into()),
    };

    let run = ScriptRun {
        outcome,
        required_paths: required_paths(),
    };
    if result_tx.send(run).is_err() {
        debug!(%task_id, "Nobody is waiting for the script result");
    }

    if keep_alive {
        serve_cleanup(&mut runtime, &task_id, &script_name, cleanup_rx);
    }
    debug!(%task_id, "Sandbox thread exiting");
}

fn serve_cleanup(
    runtime: &mut SandboxRuntime,
    task_id: &TaskId,
    script_name: &str,
    requests: mpsc::Receiver<CleanupRequest>,
) {
    // Exactly one request can arrive since invoking consumes the handle
    let Ok(request) = requests.recv() else {
        debug!(%task_id, "Cleanup handle dropped without being invoked");
        return;
    };

    let result = match runtime.clean_up() {
        Ok(Some(DriverOutcome::Cleaned)) => Ok(()),
        Ok(Some(DriverOutcome::Cleanup { error })) => Err(error.into_error(script_name, false).into()),
        Ok(Some(other)) => Err(EngineError::internal(format!(
            "Unexpected driver outcome after cleanup: {:?}",
            other
        ))),
        Ok(None) => Err(EngineError::script_runtime(
            format!("Cleanup of task {} returned a promise that never settled", task_id),
            None,
        )),
        Err(e) => Err(e.into()),
    };

    if let Err(e) = &result {
        warn!(%task_id, "Cleanup function failed: {}", e);
    }
    let _ = request.reply.send(result);
}
