//! Global error reporting

use userscript_core::EngineError;

/// Sink for failures that happen after the initiating call returned
pub trait ErrorReporter: Send + Sync {
    /// `context` names what failed, e.g. the task id and script name
    fn report(&self, error: &EngineError, context: &str);
}
