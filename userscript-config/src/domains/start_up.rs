//! Start-up scripts configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Scripts executed and mounted when the engine starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartUpConfig {
    #[serde(default = "crate::domains::default_true")]
    pub enabled: bool,
    pub scripts: Vec<String>,
}

impl Default for StartUpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scripts: Vec::new(),
        }
    }
}

impl Validatable for StartUpConfig {
    fn validate(&self) -> ConfigResult<()> {
        for name in &self.scripts {
            userscript_core::is_valid_script_name(name)
                .map_err(|e| self.validation_error(e.to_string()))?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "start_up"
    }
}
