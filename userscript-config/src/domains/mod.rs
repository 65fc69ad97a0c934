//! Domain-specific configuration modules

pub mod logging;
pub mod node;
pub mod packages;
pub mod script;
pub mod start_up;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UserScriptConfig {
    /// Node tooling configuration
    pub node: node::NodeConfig,

    /// Dependency installation and module resolution
    pub packages: packages::PackagesConfig,

    /// Script transformation and run behaviour
    pub script: script::ScriptConfig,

    /// Scripts launched when the engine starts
    pub start_up: start_up::StartUpConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl UserScriptConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.node.validate()?;
        self.packages.validate()?;
        self.script.validate()?;
        self.start_up.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        serde_yaml::to_string(&UserScriptConfig::default())
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

pub(crate) fn default_true() -> bool {
    true
}
