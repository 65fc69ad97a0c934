//! Script execution for userscript
//!
//! [`ScriptTaskManager`] turns script runs into tracked tasks: it starts the
//! sandboxed run, normalizes what `main` returned, publishes `terminate`
//! events and keeps tasks with deferred cleanup around until they are cleaned
//! up. The remaining modules provide the file-backed collaborators the
//! manager and the CLI are wired with.

pub mod current;
pub mod library;
pub mod manager;
pub mod reporter;
pub mod start_up;
pub mod storage;
pub mod transform;

#[cfg(test)]
mod test_support;

pub use current::CurrentRun;
pub use library::{ScriptLibrary, META_FILE_NAME};
pub use manager::{ManagerContext, ScriptTaskManager};
pub use reporter::{HostErrorReporter, TracingErrorReporter};
pub use start_up::StartUpReport;
pub use storage::FsScriptStorage;
pub use transform::{transformer_from_config, EsbuildTransformer, PassthroughTransformer};
