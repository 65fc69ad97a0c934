//! Script execution sandbox

use crate::console::ConsoleSink;
use crate::module_cache::ModuleCache;
use crate::resolver::ModuleResolver;
use crate::result::ScriptRun;
use crate::runtime::SandboxState;
use crate::worker::{self, SandboxJob};
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use userscript_core::{EngineError, Result, TaskId, UserScript};
use userscript_interfaces::{CodeTransformer, HostApi, HostModule};

/// One script run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub task_id: TaskId,
    pub script: UserScript,
    /// Directory holding the script's source file
    pub script_dir: PathBuf,
    /// Argument object passed to `main`
    pub args: JsonValue,
    /// Module id `require` answers with the host module
    pub host_module_id: String,
    pub resolver: ModuleResolver,
}

/// Runs user scripts in isolated Boa contexts
#[derive(Clone)]
pub struct Sandbox {
    host: Arc<dyn HostApi>,
    transformer: Arc<dyn CodeTransformer>,
    host_module: Arc<dyn HostModule>,
    sink: Arc<dyn ConsoleSink>,
    cache: ModuleCache,
}

impl Sandbox {
    pub fn new(
        host: Arc<dyn HostApi>,
        transformer: Arc<dyn CodeTransformer>,
        host_module: Arc<dyn HostModule>,
        sink: Arc<dyn ConsoleSink>,
    ) -> Self {
        Self {
            host,
            transformer,
            host_module,
            sink,
            cache: ModuleCache::new(),
        }
    }

    pub fn module_cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Read the script source and compile it for its declared language
    pub async fn compile(&self, script: &UserScript, script_dir: &std::path::Path) -> Result<(PathBuf, String)> {
        let filename = script_dir.join(script.source_file_name());
        let source = self.host.read_file(&filename).await?;
        let output = self.transformer.transform(&source, script.lang).await?;
        debug!(script = %script.name, "Script compiled");
        Ok((filename, output.code))
    }

    /// Compile the script, evaluate it in a fresh context and call
    /// `main(args, context)`.
    ///
    /// Resolves once `main` (and any promise it returned) has settled.
    /// Compilation errors are returned as errors; everything that happens
    /// inside the sandbox is reported through [`ScriptRun::outcome`].
    pub async fn run_script(&self, request: RunRequest) -> Result<ScriptRun> {
        let (filename, code) = self.compile(&request.script, &request.script_dir).await?;

        let host_context = json!({
            "taskId": request.task_id,
            "scriptName": request.script.name,
            "scriptDir": request.script_dir.to_string_lossy(),
        });

        let task_id = request.task_id.clone();
        let job = SandboxJob {
            state: SandboxState {
                task_id: request.task_id,
                sink: self.sink.clone(),
                host_module: self.host_module.clone(),
                resolver: request.resolver,
                cache: self.cache.clone(),
                required_paths: Vec::new(),
                internal_failure: None,
            },
            host_module_id: request.host_module_id,
            script_name: request.script.name.clone(),
            filename,
            code,
            args: request.args,
            host_context,
        };

        info!(%task_id, script = %request.script.name, "Starting script");
        let receiver = worker::spawn(job)?;
        receiver.await.map_err(|_| {
            EngineError::internal(format!("Sandbox thread of task {} terminated unexpectedly", task_id))
        })
    }
}
