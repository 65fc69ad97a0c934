//! Core error types for userscript

use thiserror::Error;

/// Error taxonomy shared by every public operation of the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller or the user script violated a documented precondition
    #[error("{0}")]
    InvalidUsage(String),

    /// An engine invariant was broken; this is a defect, not a user mistake
    #[error("Internal error: {0}")]
    Internal(String),

    /// The current configuration cannot perform the requested operation
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// An exception thrown by user script code
    #[error("Script error: {message}")]
    ScriptRuntime {
        message: String,
        stack: Option<String>,
    },

    /// A tracked task was aborted before it settled
    #[error("Task aborted: {0}")]
    Aborted(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for userscript
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn invalid_usage(message: impl Into<String>) -> Self {
        EngineError::InvalidUsage(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal(message.into())
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        EngineError::NotSupported(message.into())
    }

    pub fn script_runtime(message: impl Into<String>, stack: Option<String>) -> Self {
        EngineError::ScriptRuntime {
            message: message.into(),
            stack,
        }
    }

    /// Whether the error is a user mistake that should be shown as-is rather
    /// than reported as a crash
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidUsage(_)
                | EngineError::NotSupported(_)
                | EngineError::ScriptRuntime { .. }
                | EngineError::Aborted(_)
        )
    }

    /// Get the error code for RPC responses
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::InvalidUsage(_) => "INVALID_USAGE",
            EngineError::Internal(_) => "INTERNAL_ERROR",
            EngineError::NotSupported(_) => "NOT_SUPPORTED",
            EngineError::ScriptRuntime { .. } => "SCRIPT_ERROR",
            EngineError::Aborted(_) => "ABORTED",
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::Io(_) => "IO_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Message shown to the user. Internal errors carry a request to report
    /// them together with the diagnostic text.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Internal(detail) => format!(
                "An internal error occurred, please report this issue.\n\n{}",
                detail
            ),
            EngineError::ScriptRuntime {
                message,
                stack: Some(stack),
            } => format!("{}\n{}", message, stack),
            other => other.to_string(),
        }
    }
}
