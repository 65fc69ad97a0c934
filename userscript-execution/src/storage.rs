//! Filesystem-backed script storage

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use userscript_core::Result;
use userscript_interfaces::{GlobalStates, GlobalStatesPatch, ScriptStorage};

const STATE_FILE_NAME: &str = "state.json";

/// Scripts live in one directory per script below `scripts_root`; global
/// state is a JSON file next to them
pub struct FsScriptStorage {
    scripts_root: PathBuf,
    state_file: PathBuf,
    // Serializes read-modify-write cycles of the state file
    state_lock: Mutex<()>,
}

impl FsScriptStorage {
    /// Keep scripts in `<data_dir>/scripts` and state in `<data_dir>/state.json`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self::with_paths(data_dir.join("scripts"), data_dir.join(STATE_FILE_NAME))
    }

    pub fn with_paths(scripts_root: PathBuf, state_file: PathBuf) -> Self {
        Self {
            scripts_root,
            state_file,
            state_lock: Mutex::new(()),
        }
    }

    /// `userscript` below the platform data directory
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|dir| Self::new(dir.join("userscript")))
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    async fn read_states(&self) -> Result<GlobalStates> {
        match tokio::fs::read_to_string(&self.state_file).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GlobalStates::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ScriptStorage for FsScriptStorage {
    fn scripts_root(&self) -> PathBuf {
        self.scripts_root.clone()
    }

    async fn global_states(&self) -> Result<GlobalStates> {
        let _guard = self.state_lock.lock().await;
        self.read_states().await
    }

    async fn update_global_state(&self, patch: GlobalStatesPatch) -> Result<()> {
        let _guard = self.state_lock.lock().await;
        let mut states = self.read_states().await?;
        states.apply(patch);

        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.state_file, serde_json::to_string_pretty(&states)?).await?;
        debug!(path = %self.state_file.display(), "Global state saved");
        Ok(())
    }
}
