//! Host editor interfaces

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use userscript_core::Result;

/// Severity of a user notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

/// Services the host editor provides to the engine.
///
/// I/O failures surface as errors; there are no retries.
#[async_trait]
pub trait HostApi: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;

    /// Write `contents`, creating missing parent directories
    async fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    async fn dir_exists(&self, path: &Path) -> bool;

    /// Names of the sub-directories of `path`
    async fn list_dirs(&self, path: &Path) -> Result<Vec<String>>;

    async fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Append a line to the host-visible output channel
    fn append_output(&self, text: &str);

    fn show_message(&self, kind: MessageKind, message: &str);

    /// Yes/no question
    async fn confirm(&self, message: &str) -> Result<bool>;

    /// Let the user choose one of `options`; `None` when dismissed
    async fn pick(&self, message: &str, options: &[String]) -> Result<Option<usize>>;

    /// File currently open in the editor
    fn active_document(&self) -> Option<PathBuf>;
}

/// The host API object scripts receive from `require(<host module>)`.
///
/// Calls arrive on the sandbox thread of the calling script and must not
/// block on the async runtime.
pub trait HostModule: Send + Sync {
    /// Member names exposed as functions on the module object
    fn members(&self) -> Vec<String>;

    fn call(&self, member: &str, args: Vec<JsonValue>) -> Result<JsonValue>;
}
