//! Logging initialisation for userscript
//!
//! Library crates only emit `tracing` events; binaries call one of the
//! initialisers below once at start-up.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
