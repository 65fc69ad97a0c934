//! Domain-driven configuration management for userscript
//!
//! This crate provides modular configuration split by functional domains,
//! with validation, defaults, and environment variable support.

pub mod error;
pub mod loader;
pub mod provider;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use provider::{ConfigProvider, FileConfigProvider, StaticConfigProvider};

// Re-export domain configurations
pub use domains::{
    logging::{LogFormat, LogLevel, LoggingConfig},
    node::{NodeConfig, PackageManagerKind},
    packages::PackagesConfig,
    script::{AfterRunAction, ScriptConfig, TransformerKind},
    start_up::StartUpConfig,
    UserScriptConfig,
};
