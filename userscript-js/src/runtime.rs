//! Boa context setup and the native bindings behind the prelude

use crate::console::ConsoleSink;
use crate::error::SandboxError;
use crate::module_cache::ModuleCache;
use crate::resolver::{ModuleKind, ModuleResolver};
use crate::result::ResultShape;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsString, JsValue, NativeFunction, Source};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use userscript_core::{LogLevel, TaskConsoleOutput, TaskId};
use userscript_interfaces::HostModule;

const PRELUDE: &str = include_str!("js/prelude.js");

/// Everything the native bindings of one sandbox need
pub(crate) struct SandboxState {
    pub(crate) task_id: TaskId,
    pub(crate) sink: Arc<dyn ConsoleSink>,
    pub(crate) host_module: Arc<dyn HostModule>,
    pub(crate) resolver: ModuleResolver,
    pub(crate) cache: ModuleCache,
    pub(crate) required_paths: Vec<PathBuf>,
    /// Set when a binding detects a broken engine invariant
    pub(crate) internal_failure: Option<String>,
}

thread_local! {
    // One sandbox per thread; native functions are plain fn pointers and
    // reach their state through here
    static SANDBOX: RefCell<Option<SandboxState>> = const { RefCell::new(None) };
}

fn with_state<T>(f: impl FnOnce(&mut SandboxState) -> JsResult<T>) -> JsResult<T> {
    SANDBOX.with(|cell| match cell.borrow_mut().as_mut() {
        Some(state) => f(state),
        None => Err(JsNativeError::error()
            .with_message("sandbox bindings used outside of a sandbox thread")
            .into()),
    })
}

fn string_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<String> {
    let value = args.get(index).cloned().unwrap_or_else(JsValue::undefined);
    Ok(value.to_string(context)?.to_std_string_escaped())
}

fn host_log(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let level = string_arg(args, 0, context)?;
    let payload = string_arg(args, 1, context)?;

    with_state(|state| {
        let Ok(level) = level.parse::<LogLevel>() else {
            let message = format!("console adapter asked to forward unknown level '{}'", level);
            state.internal_failure = Some(message.clone());
            return Err(JsNativeError::typ().with_message(message).into());
        };
        let payload: Vec<JsonValue> = serde_json::from_str(&payload)
            .map_err(|e| JsNativeError::typ().with_message(format!("invalid console payload: {}", e)))?;
        state.sink.write(&state.task_id, TaskConsoleOutput { level, payload });
        Ok(JsValue::undefined())
    })
}

fn host_members(_this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    with_state(|state| {
        let members = JsonValue::from(state.host_module.members());
        Ok(JsValue::from(JsString::from(members.to_string())))
    })
}

fn host_call(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let member = string_arg(args, 0, context)?;
    let raw_args = string_arg(args, 1, context)?;
    let call_args: Vec<JsonValue> = serde_json::from_str(&raw_args)
        .map_err(|e| JsNativeError::typ().with_message(format!("invalid host call arguments: {}", e)))?;

    // Released before calling out so a host module may block freely
    let host_module = with_state(|state| Ok(state.host_module.clone()))?;
    match host_module.call(&member, call_args) {
        Ok(result) => Ok(JsValue::from(JsString::from(result.to_string()))),
        Err(e) => Err(JsNativeError::error().with_message(e.to_string()).into()),
    }
}

fn resolve_module(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = string_arg(args, 0, context)?;
    let from_dir = PathBuf::from(string_arg(args, 1, context)?);

    with_state(|state| {
        let Some(resolved) = state.resolver.resolve(&id, &from_dir) else {
            debug!(task_id = %state.task_id, module = %id, "Module not found");
            return Ok(JsValue::null());
        };

        let source = state.cache.load(&resolved.path).map_err(|e| {
            JsNativeError::error().with_message(format!("Failed to read module '{}': {}", resolved.path.display(), e))
        })?;
        if !state.required_paths.contains(&resolved.path) {
            state.required_paths.push(resolved.path.clone());
        }
        debug!(task_id = %state.task_id, module = %id, path = %resolved.path.display(), "Module resolved");

        let descriptor = json!({
            "path": resolved.path.to_string_lossy(),
            "dir": resolved.dir.to_string_lossy(),
            "kind": match resolved.kind {
                ModuleKind::Js => "js",
                ModuleKind::Json => "json",
            },
            "source": &*source,
        });
        Ok(JsValue::from(JsString::from(descriptor.to_string())))
    })
}

/// Error details reported by the prelude
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorInfo {
    pub(crate) message: String,
    pub(crate) name: String,
    pub(crate) stack: Option<String>,
    pub(crate) code: Option<String>,
    pub(crate) module_id: Option<String>,
}

impl ErrorInfo {
    fn display_message(&self) -> String {
        if self.message.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.message)
        }
    }

    pub(crate) fn into_error(self, script: &str, evaluating: bool) -> SandboxError {
        if self.code.as_deref() == Some("MODULE_NOT_FOUND") {
            if let Some(module) = self.module_id {
                return SandboxError::ModuleNotFound {
                    module,
                    script: script.to_string(),
                };
            }
        }
        let message = self.display_message();
        if evaluating {
            SandboxError::Evaluation { message, stack: self.stack }
        } else {
            SandboxError::Runtime { message, stack: self.stack }
        }
    }
}

/// Progress reported by the prelude driver
#[derive(Debug, Deserialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub(crate) enum DriverOutcome {
    Evaluate { error: ErrorInfo },
    Main,
    Run { error: ErrorInfo },
    Done { shape: ResultShape },
    Cleanup { error: ErrorInfo },
    Cleaned,
}

/// A Boa context prepared with the prelude. Lives on the sandbox thread.
pub(crate) struct SandboxRuntime {
    context: Context,
}

impl SandboxRuntime {
    /// Install `state` for the current thread and build a fresh context
    pub(crate) fn new(state: SandboxState, host_module_id: &str) -> Result<Self, SandboxError> {
        SANDBOX.with(|cell| *cell.borrow_mut() = Some(state));

        let mut context = Context::default();
        context.register_global_callable(js_string!("__hostLog"), 2, NativeFunction::from_fn_ptr(host_log))?;
        context.register_global_callable(js_string!("__hostCall"), 2, NativeFunction::from_fn_ptr(host_call))?;
        context.register_global_callable(js_string!("__hostMembers"), 0, NativeFunction::from_fn_ptr(host_members))?;
        context.register_global_callable(js_string!("__resolveModule"), 2, NativeFunction::from_fn_ptr(resolve_module))?;

        let host_module_literal =
            serde_json::to_string(host_module_id).map_err(|e| SandboxError::Internal(e.to_string()))?;
        let prelude = PRELUDE.replace("__HOST_MODULE_ID__", &host_module_literal);
        context.eval(Source::from_bytes(prelude.as_bytes()))?;

        Ok(Self { context })
    }

    /// Evaluate the compiled script and call its `main`, running queued
    /// promise jobs until the driver has settled
    pub(crate) fn start(
        &mut self,
        code: &str,
        filename: &Path,
        args: &JsonValue,
        host_context: &JsonValue,
    ) -> Result<Option<DriverOutcome>, SandboxError> {
        let dirname = filename.parent().unwrap_or_else(|| Path::new("/"));
        let literal = |value: &str| serde_json::to_string(value).map_err(|e| SandboxError::Internal(e.to_string()));

        let invocation = format!(
            "__userscript.start(function (exports, require, module, __filename, __dirname) {{\n{}\n}}, {}, {}, {}, {});",
            code,
            literal(&filename.to_string_lossy())?,
            literal(&dirname.to_string_lossy())?,
            literal(&args.to_string())?,
            literal(&host_context.to_string())?,
        );

        if let Err(err) = self.context.eval(Source::from_bytes(invocation.as_bytes())) {
            // The wrapper itself failed to parse, i.e. a syntax error in the script
            return Ok(Some(DriverOutcome::Evaluate {
                error: ErrorInfo {
                    message: err.to_string(),
                    name: "SyntaxError".to_string(),
                    stack: None,
                    code: None,
                    module_id: None,
                },
            }));
        }
        self.settle()
    }

    /// Call the captured cleanup function
    pub(crate) fn clean_up(&mut self) -> Result<Option<DriverOutcome>, SandboxError> {
        self.context.eval(Source::from_bytes("__userscript.cleanUp();"))?;
        self.settle()
    }

    fn settle(&mut self) -> Result<Option<DriverOutcome>, SandboxError> {
        self.context.run_jobs();

        if let Some(message) = take_internal_failure() {
            return Err(SandboxError::Internal(message));
        }

        let outcome = self.context.eval(Source::from_bytes("__userscript.outcome()"))?;
        if outcome.is_null() || outcome.is_undefined() {
            return Ok(None);
        }
        let text = outcome.to_string(&mut self.context)?.to_std_string_escaped();
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| SandboxError::Internal(format!("Malformed driver outcome: {}", e)))
    }
}

impl Drop for SandboxRuntime {
    fn drop(&mut self) {
        SANDBOX.with(|cell| cell.borrow_mut().take());
    }
}

fn take_internal_failure() -> Option<String> {
    SANDBOX.with(|cell| cell.borrow_mut().as_mut().and_then(|state| state.internal_failure.take()))
}

/// Module paths loaded so far by the sandbox on this thread
pub(crate) fn required_paths() -> Vec<PathBuf> {
    SANDBOX.with(|cell| {
        cell.borrow()
            .as_ref()
            .map(|state| state.required_paths.clone())
            .unwrap_or_default()
    })
}
