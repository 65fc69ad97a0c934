//! Normalized results of a script run

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc;
use tokio::sync::oneshot;
use userscript_core::{EngineError, Result, TaskId};

/// Request to run the captured cleanup function of a sandbox
pub(crate) struct CleanupRequest {
    pub(crate) reply: oneshot::Sender<Result<()>>,
}

/// Deferred cleanup a script handed back from `main`.
///
/// The function itself stays inside the script's sandbox; the handle asks the
/// sandbox thread to call it. Invoking consumes the handle, so a cleanup
/// function runs at most once. Dropping the handle releases the sandbox.
pub struct CleanupHandle {
    task_id: TaskId,
    requests: mpsc::Sender<CleanupRequest>,
}

impl CleanupHandle {
    pub(crate) fn new(task_id: TaskId, requests: mpsc::Sender<CleanupRequest>) -> Self {
        Self { task_id, requests }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Call the cleanup function and wait for it (and any promise it
    /// returns) to finish
    pub async fn invoke(self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.requests.send(CleanupRequest { reply }).map_err(|_| {
            EngineError::internal(format!("Sandbox of task {} is no longer running", self.task_id))
        })?;

        response.await.unwrap_or_else(|_| {
            Err(EngineError::internal(format!(
                "Sandbox of task {} exited during cleanup",
                self.task_id
            )))
        })
    }
}

impl fmt::Debug for CleanupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupHandle").field("task_id", &self.task_id).finish()
    }
}

/// What a script's `main` returned, once recognized
#[derive(Debug)]
pub enum ScriptRunResult {
    /// `undefined` or `null`
    NoResult,
    /// A bare cleanup function
    CleanupOnly(CleanupHandle),
    /// `{ custom?, cleanUp? }`
    WithCustom {
        custom: Option<JsonValue>,
        cleanup: Option<CleanupHandle>,
    },
}

impl ScriptRunResult {
    /// Split into the custom payload and the cleanup handle
    pub fn into_parts(self) -> (Option<JsonValue>, Option<CleanupHandle>) {
        match self {
            ScriptRunResult::NoResult => (None, None),
            ScriptRunResult::CleanupOnly(cleanup) => (None, Some(cleanup)),
            ScriptRunResult::WithCustom { custom, cleanup } => (custom, cleanup),
        }
    }

    pub fn has_clean_up(&self) -> bool {
        matches!(
            self,
            ScriptRunResult::CleanupOnly(_) | ScriptRunResult::WithCustom { cleanup: Some(_), .. }
        )
    }
}

/// A value returned from `main` that is none of the sanctioned shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedResult {
    pub type_name: String,
}

impl fmt::Display for UnrecognizedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "main returned {}; expected nothing, a cleanup function or {{ custom, cleanUp }}",
            self.type_name
        )
    }
}

/// Shape of the returned value as probed inside the sandbox
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResultShape {
    None,
    Cleanup,
    Object {
        #[serde(default)]
        custom: Option<JsonValue>,
        #[serde(rename = "hasCleanUp")]
        has_clean_up: bool,
    },
    Other {
        #[serde(rename = "type")]
        type_name: String,
    },
}

/// Turn a probed result shape into a [`ScriptRunResult`].
///
/// `cleanup` is only called when the shape carries a cleanup function.
pub fn classify<F>(shape: ResultShape, cleanup: F) -> std::result::Result<ScriptRunResult, UnrecognizedResult>
where
    F: FnOnce() -> CleanupHandle,
{
    match shape {
        ResultShape::None => Ok(ScriptRunResult::NoResult),
        ResultShape::Cleanup => Ok(ScriptRunResult::CleanupOnly(cleanup())),
        ResultShape::Object {
            custom,
            has_clean_up,
        } => Ok(ScriptRunResult::WithCustom {
            custom,
            cleanup: has_clean_up.then(cleanup),
        }),
        ResultShape::Other { type_name } => Err(UnrecognizedResult { type_name }),
    }
}

/// How a script run ended
#[derive(Debug)]
pub enum RunOutcome {
    Returned(ScriptRunResult),
    Unrecognized(UnrecognizedResult),
    Failed(EngineError),
}

/// Outcome of a run plus the modules it loaded
#[derive(Debug)]
pub struct ScriptRun {
    pub outcome: RunOutcome,
    pub required_paths: Vec<PathBuf>,
}

impl ScriptRun {
    pub fn failed(error: EngineError) -> Self {
        Self {
            outcome: RunOutcome::Failed(error),
            required_paths: Vec::new(),
        }
    }
}
