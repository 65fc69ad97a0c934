//! Core domain models and types for userscript
//!
//! This crate contains the fundamental types shared by the execution
//! sandbox, the task manager and the package installer. It has minimal
//! dependencies and defines the domain language of the engine.

pub mod error;
pub mod events;
pub mod script;
pub mod task;

// Re-export commonly used types at the crate root
pub use error::{EngineError, Result};
pub use events::{
    wait_for_termination, EngineEvent, EventChannel, LogLevel, TaskConsoleOutput, TaskEvent,
    TaskTermination,
};
pub use script::{
    is_valid_script_name, ArgumentConfig, ArgumentField, EnumOption, ScriptLang, UserScript,
    RESERVED_NAME_CHARS,
};
pub use task::{allocate_task_id, ExecutionTask, TaskId, TASK_ID_LEN};
