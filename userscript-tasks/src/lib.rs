//! Generic asynchronous task service
//!
//! A [`TaskService`] tracks units of background work (subprocesses, script
//! runs) behind opaque task ids. Work is started by a factory that receives a
//! [`TaskSettler`]; the settler is the only way a task reaches its final
//! state.

pub mod service;
pub mod state;

pub use service::{TaskService, TaskSettler};
pub use state::{TaskSnapshot, TaskState};
