//! JavaScript execution sandbox for userscript
//!
//! Every script run gets a fresh Boa context on its own thread. The context
//! is seeded with a console adapter that forwards to a [`ConsoleSink`], a
//! `require` that hands out the host module or resolves packages from the
//! configured `node_modules` roots, and a small driver that calls the
//! script's `main` and reports the shape of what it returned.

pub mod console;
pub mod error;
pub mod module_cache;
pub mod resolver;
pub mod result;
pub mod sandbox;
mod runtime;
mod worker;

pub use console::{ConsoleSink, EventConsoleSink, CONSOLE_TARGET};
pub use error::SandboxError;
pub use module_cache::ModuleCache;
pub use resolver::{ModuleResolver, ResolvedModule};
pub use result::{classify, CleanupHandle, ResultShape, RunOutcome, ScriptRun, ScriptRunResult, UnrecognizedResult};
pub use sandbox::{RunRequest, Sandbox};
