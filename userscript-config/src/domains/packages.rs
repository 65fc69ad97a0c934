//! Dependency installation configuration

use crate::error::ConfigResult;
use crate::validation::{validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Dependency installation and module resolution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Directory whose `node_modules` is searched first and where local
    /// installs run. When unset only global installs are possible and
    /// `require` searches the global roots alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Whether global package-manager directories take part in `require`
    #[serde(default = "crate::domains::default_true")]
    pub include_global_roots: bool,

    /// Registry passed to the package manager
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            root: None,
            include_global_roots: true,
            registry: None,
        }
    }
}

impl Validatable for PackagesConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(registry) = &self.registry {
            validate_url(registry, "registry", self.domain_name())?;
        }
        if let Some(root) = &self.root {
            if root.as_os_str().is_empty() {
                return Err(self.validation_error("root cannot be empty"));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "packages"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packages_defaults() {
        let config = PackagesConfig::default();
        assert!(config.include_global_roots);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_registry_validation() {
        let mut config = PackagesConfig::default();
        config.registry = Some("https://registry.npmmirror.com".into());
        assert!(config.validate().is_ok());

        config.registry = Some("file:///tmp".into());
        assert!(config.validate().is_err());
    }
}
