//! # Userscript Interfaces
//!
//! Traits for the collaborators the engine consumes but does not own:
//! script storage, configuration, code transformation, the host editor API,
//! error reporting and package registry queries.
//!
//! ## Main Interfaces
//!
//! - [`ScriptStorage`] - script locations and global state
//! - [`CodeTransformer`] - compiles script sources to executable JavaScript
//! - [`HostApi`] - file access, output channel and prompts of the host
//! - [`HostModule`] - the host API object handed to scripts through `require`
//! - [`ErrorReporter`] - global sink for background failures
//! - [`PackageRegistry`] - read-only version queries
//! - [`PackageRoots`] - where `require` looks for installed packages

pub mod host;
pub mod registry;
pub mod reporter;
pub mod storage;
pub mod transform;

pub use host::{HostApi, HostModule, MessageKind};
pub use registry::{PackageRegistry, PackageRoots};
pub use reporter::ErrorReporter;
pub use storage::{GlobalStates, GlobalStatesPatch, ScriptStorage};
pub use transform::{CodeTransformer, TransformOutput};
pub use userscript_config::ConfigProvider;
