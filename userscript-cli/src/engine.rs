//! Wiring of the engine services for one CLI invocation

use crate::host::{LocalHost, TerminalHostModule};
use std::sync::Arc;
use userscript_config::{ConfigProvider, FileConfigProvider};
use userscript_core::EventChannel;
use userscript_execution::{
    transformer_from_config, FsScriptStorage, HostErrorReporter, ManagerContext, ScriptLibrary, ScriptTaskManager,
};
use userscript_interfaces::HostApi;
use userscript_js::{EventConsoleSink, Sandbox};
use userscript_packages::{NodeModuleRoots, NpmRegistry, PackageManagerPrograms, PackageService};

pub struct Engine {
    pub library: ScriptLibrary,
    pub manager: ScriptTaskManager,
    pub packages: PackageService,
}

impl Engine {
    pub fn new(config: Arc<FileConfigProvider>, host: Arc<LocalHost>, storage: FsScriptStorage) -> Self {
        let provider: Arc<dyn ConfigProvider> = config;
        let host_api: Arc<dyn HostApi> = host;
        let snapshot = provider.configs();

        let events = EventChannel::new();
        let storage = Arc::new(storage);
        let programs = PackageManagerPrograms::new();

        let sink = EventConsoleSink::new(events.clone()).with_host(host_api.clone());
        let sandbox = Sandbox::new(
            host_api.clone(),
            transformer_from_config(&snapshot.script),
            Arc::new(TerminalHostModule::new(host_api.clone())),
            Arc::new(sink),
        );

        let library = ScriptLibrary::new(storage.clone(), host_api.clone(), events.clone());
        let manager = ScriptTaskManager::new(ManagerContext {
            sandbox,
            storage,
            config: provider.clone(),
            host: host_api.clone(),
            roots: Arc::new(NodeModuleRoots::new(provider.clone(), programs.clone())),
            reporter: Arc::new(HostErrorReporter::new(host_api.clone())),
            events,
        });

        let registry = Arc::new(NpmRegistry::new(programs.clone(), snapshot.packages.registry));
        let packages = PackageService::new(provider, host_api, registry, programs);

        Self {
            library,
            manager,
            packages,
        }
    }
}
