//! Engine assembled from the real crates with in-memory host fakes

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use userscript_config::{StaticConfigProvider, UserScriptConfig};
use userscript_core::{EngineError, EventChannel, Result, ScriptLang, UserScript};
use userscript_execution::{
    FsScriptStorage, ManagerContext, PassthroughTransformer, ScriptLibrary, ScriptTaskManager,
};
use userscript_interfaces::{ErrorReporter, HostApi, HostModule, MessageKind, PackageRoots};
use userscript_js::{EventConsoleSink, Sandbox};

/// Filesystem-backed host that records everything shown to the user
#[derive(Default)]
pub struct RecordingHost {
    pub output: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<(MessageKind, String)>>,
    pub confirm_answer: Mutex<bool>,
    pub confirmations: Mutex<Vec<String>>,
}

#[async_trait]
impl HostApi for RecordingHost {
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
        self.confirmations.lock().unwrap().push(message.to_string());
        Ok(*self.confirm_answer.lock().unwrap())
    }

    async fn pick(&self, _message: &str, _options: &[String]) -> Result<Option<usize>> {
        Ok(None)
    }

    fn active_document(&self) -> Option<PathBuf> {
        None
    }
}

/// Host module exposing `greet(name)` and recording every call
#[derive(Default)]
pub struct GreeterModule {
    pub calls: Mutex<Vec<(String, Vec<JsonValue>)>>,
}

impl HostModule for GreeterModule {
    fn members(&self) -> Vec<String> {
        vec!["greet".to_string()]
    }

    fn call(&self, member: &str, args: Vec<JsonValue>) -> Result<JsonValue> {
        self.calls.lock().unwrap().push((member.to_string(), args.clone()));
        match (member, args.first()) {
            ("greet", Some(JsonValue::String(name))) => Ok(JsonValue::String(format!("hello {}", name))),
            _ => Err(EngineError::invalid_usage(format!("bad host call {}", member))),
        }
    }
}

pub struct FixedRoots(pub Vec<PathBuf>);

#[async_trait]
impl PackageRoots for FixedRoots {
    async fn module_roots(&self) -> Vec<PathBuf> {
        self.0.clone()
    }
}

/// Keeps `(error code, context)` of every report
#[derive(Default)]
pub struct RecordingReporter {
    pub reports: Mutex<Vec<(String, String)>>,
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &EngineError, context: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((error.error_code().to_string(), context.to_string()));
    }
}

pub struct TestEngine {
    pub dir: tempfile::TempDir,
    pub host: Arc<RecordingHost>,
    pub host_module: Arc<GreeterModule>,
    pub reporter: Arc<RecordingReporter>,
    pub library: ScriptLibrary,
    pub manager: ScriptTaskManager,
}

impl TestEngine {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let events = EventChannel::new();
        let host = Arc::new(RecordingHost::default());
        let host_module = Arc::new(GreeterModule::default());
        let reporter = Arc::new(RecordingReporter::default());
        let storage = Arc::new(FsScriptStorage::new(dir.path().join("data")));

        let sandbox = Sandbox::new(
            host.clone(),
            Arc::new(PassthroughTransformer),
            host_module.clone(),
            Arc::new(EventConsoleSink::new(events.clone()).with_host(host.clone())),
        );
        let library = ScriptLibrary::new(storage.clone(), host.clone(), events.clone());
        let manager = ScriptTaskManager::new(ManagerContext {
            sandbox,
            storage,
            config: Arc::new(StaticConfigProvider::new(UserScriptConfig::default())),
            host: host.clone(),
            roots: Arc::new(FixedRoots(vec![dir.path().join("packages").join("node_modules")])),
            reporter: reporter.clone(),
            events,
        });

        Self {
            dir,
            host,
            host_module,
            reporter,
            library,
            manager,
        }
    }

    pub async fn script(&self, name: &str, source: &str) -> UserScript {
        let script = UserScript::new(name, ScriptLang::Js);
        self.library.create_script(&script, Some(source)).await.unwrap();
        script
    }

    /// Write a file below the temporary directory
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }
}

/// Write an executable shell script standing in for a package manager
#[cfg(unix)]
pub fn fake_program(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
