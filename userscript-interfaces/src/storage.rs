//! Script storage interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use userscript_core::Result;

/// Values persisted across sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_script: Option<String>,
}

/// Partial update of [`GlobalStates`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStatesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_script: Option<String>,
}

impl GlobalStates {
    pub fn apply(&mut self, patch: GlobalStatesPatch) {
        if let Some(name) = patch.last_executed_script {
            self.last_executed_script = Some(name);
        }
    }
}

/// Where scripts live and where global state is kept
#[async_trait]
pub trait ScriptStorage: Send + Sync {
    /// Root directory holding one sub-directory per script
    fn scripts_root(&self) -> PathBuf;

    /// Path below the scripts root
    fn based_on_scripts(&self, segments: &[&str]) -> PathBuf {
        segments
            .iter()
            .fold(self.scripts_root(), |path, segment| path.join(segment))
    }

    async fn global_states(&self) -> Result<GlobalStates>;

    async fn update_global_state(&self, patch: GlobalStatesPatch) -> Result<()>;
}
