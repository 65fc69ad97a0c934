//! Configuration collaborator used by the engine services

use crate::domains::UserScriptConfig;
use crate::error::ConfigResult;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, info};

/// Read and update the active configuration
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Snapshot of the current configuration
    fn configs(&self) -> UserScriptConfig;

    /// Merge a JSON patch into the configuration and persist it
    async fn update_configs(&self, patch: JsonValue) -> ConfigResult<()>;
}

/// Recursively merge `patch` into `target`; `null` in the patch clears a key
fn merge_patch(target: &mut JsonValue, patch: JsonValue) {
    match (target, patch) {
        (JsonValue::Object(target), JsonValue::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(&key);
                } else {
                    merge_patch(target.entry(key).or_insert(JsonValue::Null), value);
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

fn apply_patch(config: &UserScriptConfig, patch: JsonValue) -> ConfigResult<UserScriptConfig> {
    let mut value = serde_json::to_value(config)?;
    merge_patch(&mut value, patch);
    let updated: UserScriptConfig = serde_json::from_value(value)?;
    updated.validate_all()?;
    Ok(updated)
}

/// Configuration held in memory only
pub struct StaticConfigProvider {
    config: RwLock<UserScriptConfig>,
}

impl StaticConfigProvider {
    pub fn new(config: UserScriptConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    fn configs(&self) -> UserScriptConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn update_configs(&self, patch: JsonValue) -> ConfigResult<()> {
        let updated = apply_patch(&self.configs(), patch)?;
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = updated;
        Ok(())
    }
}

/// Configuration backed by a YAML file
pub struct FileConfigProvider {
    path: PathBuf,
    config: RwLock<UserScriptConfig>,
}

impl FileConfigProvider {
    /// Load `path` (or defaults plus environment when it does not exist)
    pub fn open(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let config = crate::loader::ConfigLoader::new().load(Some(&path))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(Self {
            path,
            config: RwLock::new(config),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    fn configs(&self) -> UserScriptConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn update_configs(&self, patch: JsonValue) -> ConfigResult<()> {
        let updated = apply_patch(&self.configs(), patch)?;
        let yaml = serde_yaml::to_string(&updated)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, yaml).await?;

        *self.config.write().unwrap_or_else(|e| e.into_inner()) = updated;
        info!("Configuration saved to {}", self.path.display());
        Ok(())
    }
}
