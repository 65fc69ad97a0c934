//! Fixtures shared by the unit tests of this crate

use crate::library::ScriptLibrary;
use crate::manager::{ManagerContext, ScriptTaskManager};
use crate::storage::FsScriptStorage;
use crate::transform::PassthroughTransformer;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use userscript_config::{StaticConfigProvider, TransformerKind, UserScriptConfig};
use userscript_core::{EngineError, EventChannel, Result, ScriptLang, UserScript};
use userscript_interfaces::{ErrorReporter, HostApi, HostModule, MessageKind, PackageRoots};
use userscript_js::{EventConsoleSink, Sandbox};

#[derive(Default)]
pub(crate) struct TestHost {
    pub(crate) output: Mutex<Vec<String>>,
    pub(crate) messages: Mutex<Vec<(MessageKind, String)>>,
    pub(crate) prompts: Mutex<Vec<String>>,
    pub(crate) pick_answer: Mutex<Option<usize>>,
    pub(crate) active_document: Mutex<Option<PathBuf>>,
}

#[async_trait]
impl HostApi for TestHost {
    async fn read_file(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(path, contents).await?)
    }

    async fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    async fn list_dirs(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::remove_dir_all(path).await?)
    }

    fn append_output(&self, text: &str) {
        self.output.lock().unwrap().push(text.to_string());
    }

    fn show_message(&self, kind: MessageKind, message: &str) {
        self.messages.lock().unwrap().push((kind, message.to_string()));
    }

    async fn confirm(&self, message: &str) -> Result<bool> {
        self.prompts.lock().unwrap().push(message.to_string());
        Ok(false)
    }

    async fn pick(&self, message: &str, _options: &[String]) -> Result<Option<usize>> {
        self.prompts.lock().unwrap().push(message.to_string());
        Ok(*self.pick_answer.lock().unwrap())
    }

    fn active_document(&self) -> Option<PathBuf> {
        self.active_document.lock().unwrap().clone()
    }
}

/// Host module whose `waitForRelease()` blocks the script until
/// [`HostGate::release`] is called
#[derive(Default)]
pub(crate) struct HostGate {
    released: Mutex<bool>,
    changed: Condvar,
}

impl HostGate {
    pub(crate) fn release(&self) {
        *self.released.lock().unwrap() = true;
        self.changed.notify_all();
    }
}

impl HostModule for HostGate {
    fn members(&self) -> Vec<String> {
        vec!["waitForRelease".to_string()]
    }

    fn call(&self, member: &str, _args: Vec<JsonValue>) -> Result<JsonValue> {
        if member != "waitForRelease" {
            return Err(EngineError::invalid_usage(format!("no host member {}", member)));
        }
        let mut released = self.released.lock().unwrap();
        while !*released {
            released = self.changed.wait(released).unwrap();
        }
        Ok(JsonValue::Null)
    }
}

struct FixedRoots(Vec<PathBuf>);

#[async_trait]
impl PackageRoots for FixedRoots {
    async fn module_roots(&self) -> Vec<PathBuf> {
        self.0.clone()
    }
}

/// Keeps `("<code> <error>", context)` of every report
#[derive(Default)]
pub(crate) struct RecordingReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub(crate) fn reported(&self) -> Vec<(String, String)> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &EngineError, context: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((format!("{} {}", error.error_code(), error), context.to_string()));
    }
}

pub(crate) struct Harness {
    pub(crate) dir: tempfile::TempDir,
    pub(crate) host: Arc<TestHost>,
    pub(crate) reporter: Arc<RecordingReporter>,
    pub(crate) gate: Arc<HostGate>,
    pub(crate) library: ScriptLibrary,
    pub(crate) manager: ScriptTaskManager,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_config(UserScriptConfig::default())
    }

    pub(crate) fn with_config(mut config: UserScriptConfig) -> Self {
        config.script.transformer = TransformerKind::None;

        let dir = tempfile::tempdir().unwrap();
        let events = EventChannel::new();
        let host = Arc::new(TestHost::default());
        let reporter = Arc::new(RecordingReporter::default());
        let gate = Arc::new(HostGate::default());
        let storage = Arc::new(FsScriptStorage::new(dir.path().join("data")));

        let sink = EventConsoleSink::new(events.clone()).with_host(host.clone());
        let sandbox = Sandbox::new(
            host.clone(),
            Arc::new(PassthroughTransformer),
            gate.clone(),
            Arc::new(sink),
        );

        let library = ScriptLibrary::new(storage.clone(), host.clone(), events.clone());
        let manager = ScriptTaskManager::new(ManagerContext {
            sandbox,
            storage,
            config: Arc::new(StaticConfigProvider::new(config)),
            host: host.clone(),
            roots: Arc::new(FixedRoots(vec![dir.path().join("node_modules")])),
            reporter: reporter.clone(),
            events,
        });

        Self {
            dir,
            host,
            reporter,
            gate,
            library,
            manager,
        }
    }

    pub(crate) fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Create a JavaScript script with the given source
    pub(crate) async fn script(&self, name: &str, source: &str) -> UserScript {
        let script = UserScript::new(name, ScriptLang::Js);
        self.library.create_script(&script, Some(source)).await.unwrap();
        script
    }
}
