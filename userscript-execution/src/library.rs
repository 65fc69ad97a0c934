//! Script library
//!
//! Each script is a directory below the storage's scripts root holding the
//! source file `index.<lang>` and `meta.json` with the serialized
//! [`UserScript`]. Creating, importing and deleting scripts publishes a
//! `script-list-update` event.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use userscript_core::{
    is_valid_script_name, EngineError, EngineEvent, EventChannel, Result, ScriptLang, UserScript,
};
use userscript_interfaces::{HostApi, ScriptStorage};

/// Name of the metadata file next to a script's source
pub const META_FILE_NAME: &str = "meta.json";

const JS_TEMPLATE: &str = r#"exports.main = async function (args, context) {
  console.log('Hello from', context.scriptName, args);
};
"#;

const TS_TEMPLATE: &str = r#"export async function main(args: Record<string, unknown>, context: { scriptName: string }) {
  console.log('Hello from', context.scriptName, args);
}
"#;

/// Read and parse a script's `meta.json`
pub async fn load_meta(host: &dyn HostApi, meta_path: &Path) -> Result<UserScript> {
    let contents = host.read_file(meta_path).await?;
    serde_json::from_str(&contents).map_err(|e| {
        EngineError::invalid_usage(format!(
            "Script metadata '{}' is malformed: {}",
            meta_path.display(),
            e
        ))
    })
}

/// Create, edit and enumerate the user's scripts
pub struct ScriptLibrary {
    storage: Arc<dyn ScriptStorage>,
    host: Arc<dyn HostApi>,
    events: EventChannel,
}

impl ScriptLibrary {
    pub fn new(storage: Arc<dyn ScriptStorage>, host: Arc<dyn HostApi>, events: EventChannel) -> Self {
        Self {
            storage,
            host,
            events,
        }
    }

    pub fn script_dir(&self, name: &str) -> PathBuf {
        self.storage.based_on_scripts(&[name])
    }

    pub fn source_path(&self, script: &UserScript) -> PathBuf {
        self.storage
            .based_on_scripts(&[&script.name, &script.source_file_name()])
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.storage.based_on_scripts(&[name, META_FILE_NAME])
    }

    async fn write_meta(&self, script: &UserScript) -> Result<()> {
        let meta = serde_json::to_string_pretty(script)?;
        self.host.write_file(&self.meta_path(&script.name), &meta).await
    }

    async fn ensure_exists(&self, name: &str) -> Result<()> {
        if self.host.dir_exists(&self.script_dir(name)).await {
            Ok(())
        } else {
            Err(EngineError::invalid_usage(format!("Script '{}' not found", name)))
        }
    }

    /// Create a new script. `source` defaults to a starter template.
    pub async fn create_script(&self, script: &UserScript, source: Option<&str>) -> Result<()> {
        is_valid_script_name(&script.name)?;
        if self.host.dir_exists(&self.script_dir(&script.name)).await {
            return Err(EngineError::invalid_usage(format!(
                "Script '{}' already exists",
                script.name
            )));
        }

        let source = source.unwrap_or(match script.lang {
            ScriptLang::Js => JS_TEMPLATE,
            ScriptLang::Ts => TS_TEMPLATE,
        });
        self.host.write_file(&self.source_path(script), source).await?;
        self.write_meta(script).await?;

        info!(script = %script.name, lang = %script.lang, "Script created");
        self.events.emit(EngineEvent::ScriptListUpdate);
        Ok(())
    }

    /// Replace the metadata of an existing script
    pub async fn update_script(&self, script: &UserScript) -> Result<()> {
        let current = self.get_script(&script.name).await?;
        if current.lang != script.lang {
            return Err(EngineError::not_supported(format!(
                "Changing the language of script '{}' from {} to {}",
                script.name, current.lang, script.lang
            )));
        }
        self.write_meta(script).await?;
        info!(script = %script.name, "Script updated");
        Ok(())
    }

    pub async fn delete_script(&self, name: &str) -> Result<()> {
        is_valid_script_name(name)?;
        self.ensure_exists(name).await?;
        self.host.remove_dir(&self.script_dir(name)).await?;

        info!(script = %name, "Script deleted");
        self.events.emit(EngineEvent::ScriptListUpdate);
        Ok(())
    }

    /// Turn an existing `.js`/`.ts` file into a new script named after the
    /// file unless `name` is given
    pub async fn import_script(&self, file: &Path, name: Option<&str>) -> Result<UserScript> {
        let lang = match file.extension().and_then(|ext| ext.to_str()) {
            Some("js") => ScriptLang::Js,
            Some("ts") => ScriptLang::Ts,
            _ => {
                return Err(EngineError::invalid_usage(format!(
                    "Cannot import '{}': only .js and .ts files are supported",
                    file.display()
                )))
            }
        };
        let name = match name {
            Some(name) => name.to_string(),
            None => file
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let source = self.host.read_file(file).await?;
        let script = UserScript::new(name, lang);
        self.create_script(&script, Some(&source)).await?;
        Ok(script)
    }

    pub async fn get_script(&self, name: &str) -> Result<UserScript> {
        is_valid_script_name(name)?;
        self.ensure_exists(name).await?;
        load_meta(self.host.as_ref(), &self.meta_path(name)).await
    }

    /// Every script with readable metadata, sorted by name
    pub async fn list_scripts(&self) -> Result<Vec<UserScript>> {
        let root = self.storage.scripts_root();
        if !self.host.dir_exists(&root).await {
            return Ok(Vec::new());
        }

        let mut scripts = Vec::new();
        for dir in self.host.list_dirs(&root).await? {
            match load_meta(self.host.as_ref(), &self.meta_path(&dir)).await {
                Ok(script) => scripts.push(script),
                Err(e) => warn!(dir = %dir, "Skipping script directory: {}", e),
            }
        }
        scripts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(scripts)
    }
}
