//! Loaded module sources shared across runs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use userscript_core::{EngineError, Result};

/// Source text of every module a script has required, keyed by its resolved
/// absolute path.
///
/// Entries stay cached until the task that loaded them is cleaned up, so a
/// module edited on disk is picked up by the next run after that.
#[derive(Clone, Default)]
pub struct ModuleCache {
    entries: Arc<Mutex<HashMap<PathBuf, Arc<str>>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<str>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached source of `path`, reading the file on a miss
    pub fn load(&self, path: &Path) -> std::io::Result<Arc<str>> {
        if let Some(source) = self.entries().get(path) {
            return Ok(source.clone());
        }

        let source: Arc<str> = Arc::from(std::fs::read_to_string(path)?);
        self.entries().insert(path.to_path_buf(), source.clone());
        debug!(module = %path.display(), "Module source cached");
        Ok(source)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drop the entry for `path`. Returns whether an entry was present.
    ///
    /// Paths recorded by the resolver are always absolute; anything else
    /// means the eviction list was corrupted.
    pub fn evict(&self, path: &Path) -> Result<bool> {
        if !path.is_absolute() {
            return Err(EngineError::internal(format!(
                "Cannot evict module cache entry for relative path '{}'",
                path.display()
            )));
        }
        Ok(self.entries().remove(path).is_some())
    }

    /// Evict every path, continuing past failures. The first failure is
    /// returned once all other entries are gone.
    pub fn evict_all<'a>(&self, paths: impl IntoIterator<Item = &'a PathBuf>) -> Result<()> {
        let mut first_error = None;
        for path in paths {
            if let Err(e) = self.evict(path) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
