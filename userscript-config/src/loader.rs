//! Configuration loading and environment variable handling

use crate::domains::UserScriptConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "USERSCRIPT".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<UserScriptConfig> {
        let content = std::fs::read_to_string(path)?;
        self.from_yaml(&content)
    }

    /// Parse YAML content with environment overrides
    pub fn from_yaml(&self, content: &str) -> ConfigResult<UserScriptConfig> {
        let mut config: UserScriptConfig = if content.trim().is_empty() {
            UserScriptConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<UserScriptConfig> {
        let mut config = UserScriptConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<UserScriptConfig> {
        match config_path {
            Some(path) if path.as_ref().exists() => self.from_file(path),
            _ => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut UserScriptConfig) -> ConfigResult<()> {
        if let Ok(manager) = self.get_env_var("PACKAGE_MANAGER") {
            config.node.package_manager = FromStr::from_str(&manager)
                .map_err(|e| ConfigError::EnvError(format!("Invalid PACKAGE_MANAGER: {}", e)))?;
        }

        if let Ok(root) = self.get_env_var("PACKAGES_ROOT") {
            config.packages.root = Some(PathBuf::from(root));
        }

        if let Ok(transformer) = self.get_env_var("TRANSFORMER") {
            config.script.transformer = FromStr::from_str(&transformer)
                .map_err(|e| ConfigError::EnvError(format!("Invalid TRANSFORMER: {}", e)))?;
        }

        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = FromStr::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.logging.format = FromStr::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
