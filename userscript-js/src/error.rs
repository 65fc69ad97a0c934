//! Sandbox error types

use thiserror::Error;
use userscript_core::EngineError;

/// Failures of a sandboxed script run
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Syntax or runtime error while evaluating the module body
    #[error("Evaluation error: {message}")]
    Evaluation {
        message: String,
        stack: Option<String>,
    },

    /// Exception thrown by `main`, its returned promise or a cleanup function
    #[error("{message}")]
    Runtime {
        message: String,
        stack: Option<String>,
    },

    #[error("Cannot find module '{module}' required by script '{script}'")]
    ModuleNotFound { module: String, script: String },

    #[error("Script '{0}' does not export a main function")]
    MissingMain(String),

    #[error("Script '{0}' returned a promise that never settled")]
    NeverSettled(String),

    #[error("JavaScript engine error: {0}")]
    Engine(String),

    #[error("Sandbox failure: {0}")]
    Internal(String),
}

impl From<boa_engine::JsError> for SandboxError {
    fn from(err: boa_engine::JsError) -> Self {
        SandboxError::Engine(err.to_string())
    }
}

impl From<SandboxError> for EngineError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Evaluation { message, stack } | SandboxError::Runtime { message, stack } => {
                EngineError::ScriptRuntime { message, stack }
            }
            SandboxError::NeverSettled(_) => EngineError::script_runtime(err.to_string(), None),
            SandboxError::ModuleNotFound { .. } | SandboxError::MissingMain(_) => {
                EngineError::invalid_usage(err.to_string())
            }
            SandboxError::Engine(_) | SandboxError::Internal(_) => EngineError::internal(err.to_string()),
        }
    }
}
