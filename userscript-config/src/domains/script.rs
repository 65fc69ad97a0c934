//! Script transformation and run configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Compiler used to turn script sources into executable JavaScript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransformerKind {
    /// JavaScript only, sources are evaluated as written
    None,
    #[default]
    Esbuild,
}

impl FromStr for TransformerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TransformerKind::None),
            "esbuild" => Ok(TransformerKind::Esbuild),
            _ => Err(format!("Invalid transformer: {}", s)),
        }
    }
}

/// What to do with a task left pending cleanup by "run current script"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AfterRunAction {
    /// Ask the user through the host
    #[default]
    Prompt,
    CleanUp,
    Mount,
    /// Leave the task pending
    Keep,
}

/// Script configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub transformer: TransformerKind,

    /// Executable used by the esbuild transformer
    pub esbuild_path: String,

    pub after_current_run: AfterRunAction,

    /// Module id under which the host API is injected into `require`
    pub host_module: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            transformer: TransformerKind::default(),
            esbuild_path: "esbuild".to_string(),
            after_current_run: AfterRunAction::default(),
            host_module: "vscode".to_string(),
        }
    }
}

impl Validatable for ScriptConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.host_module, "host_module", self.domain_name())?;
        if self.transformer == TransformerKind::Esbuild {
            validate_required_string(&self.esbuild_path, "esbuild_path", self.domain_name())?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "script"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_config_defaults() {
        let config = ScriptConfig::default();
        assert_eq!(config.host_module, "vscode");
        assert_eq!(config.after_current_run, AfterRunAction::Prompt);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_host_module_rejected() {
        let config = ScriptConfig {
            host_module: String::new(),
            ..ScriptConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_esbuild_path_only_required_for_esbuild() {
        let mut config = ScriptConfig {
            esbuild_path: String::new(),
            ..ScriptConfig::default()
        };
        assert!(config.validate().is_err());

        config.transformer = TransformerKind::None;
        assert!(config.validate().is_ok());
    }
}
