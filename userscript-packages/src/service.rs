//! Install orchestration over the generic task service

use crate::installer::{InstallOptions, InstallRequest, Installer, PackageManagerPrograms};
use crate::process::{spawn_install, InstallOutput, ProcessHandle, RunningInstall};
use crate::versions::sort_versions;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use userscript_config::PackageManagerKind;
use userscript_core::{EngineError, Result, TaskId};
use userscript_interfaces::{ConfigProvider, HostApi, MessageKind, PackageRegistry};
use userscript_tasks::{TaskService, TaskSettler, TaskSnapshot};

/// Reason given to waiters of an install cancelled by the user
pub const CANCELLED_REASON: &str = "Installation cancelled by the user";

struct InstallContext {
    config: Arc<dyn ConfigProvider>,
    host: Arc<dyn HostApi>,
    programs: PackageManagerPrograms,
}

impl InstallContext {
    /// The preferred package manager, or with the user's consent the first
    /// other one found on the host
    async fn select_installer(&self) -> Result<Installer> {
        let preferred = self.config.configs().node.package_manager;
        if self.programs.detect(preferred).await {
            return Ok(self.programs.installer(preferred));
        }

        for alternate in PackageManagerKind::ALL.into_iter().filter(|kind| *kind != preferred) {
            if !self.programs.detect(alternate).await {
                continue;
            }
            let question = format!(
                "{} was not found on this machine. Install with {} instead?",
                preferred, alternate
            );
            if self.host.confirm(&question).await? {
                info!(%preferred, %alternate, "Falling back to alternate package manager");
                return Ok(self.programs.installer(alternate));
            }
            return Err(EngineError::invalid_usage(format!(
                "{} is not available and using {} was declined",
                preferred, alternate
            )));
        }

        Err(EngineError::invalid_usage(format!(
            "No package manager found; install {} (or one of npm, yarn, pnpm) first",
            preferred
        )))
    }

    fn working_dir(&self, request: &InstallRequest) -> Result<Option<PathBuf>> {
        if request.is_global() {
            return Ok(None);
        }
        self.config
            .configs()
            .packages
            .root
            .map(Some)
            .ok_or_else(|| EngineError::invalid_usage("Set packages.root to install packages locally"))
    }

    async fn launch(&self, request: &InstallRequest) -> Result<RunningInstall> {
        let cwd = self.working_dir(request)?;
        let installer = self.select_installer().await?;
        if let Some(cwd) = &cwd {
            tokio::fs::create_dir_all(cwd).await?;
        }

        let registry = self.config.configs().packages.registry;
        let args = installer.install_args(request, registry.as_deref());
        spawn_install(&installer, args, cwd.as_deref())
    }

    async fn start(
        &self,
        request: InstallRequest,
        settler: TaskSettler<ProcessHandle, InstallOutput>,
    ) -> Result<ProcessHandle> {
        match self.launch(&request).await {
            Ok(running) => Ok(running.supervise(settler)),
            Err(error) => {
                // The waiter gets the launch error itself
                let summary = format!("Install of {} did not start", request.describe());
                settler.reject(error);
                Err(EngineError::internal(summary))
            }
        }
    }
}

/// Installs packages as killable tasks
#[derive(Clone)]
pub struct PackageService {
    tasks: TaskService<InstallRequest, ProcessHandle, InstallOutput>,
    context: Arc<InstallContext>,
    registry: Arc<dyn PackageRegistry>,
}

impl PackageService {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        host: Arc<dyn HostApi>,
        registry: Arc<dyn PackageRegistry>,
        programs: PackageManagerPrograms,
    ) -> Self {
        let context = Arc::new(InstallContext {
            config,
            host,
            programs,
        });

        let factory_context = context.clone();
        let tasks = TaskService::new(
            move |request: InstallRequest, settler: TaskSettler<ProcessHandle, InstallOutput>| {
                let context = factory_context.clone();
                async move { context.start(request, settler).await }
            },
            |handle: ProcessHandle| async move {
                handle.terminate();
                Ok(())
            },
        );

        Self {
            tasks,
            context,
            registry,
        }
    }

    /// Start an install task. The process runs in the background; see
    /// [`wait_install`](Self::wait_install).
    pub async fn start_install(&self, request: InstallRequest) -> Result<TaskId> {
        if let InstallRequest::Modules { modules, .. } = &request {
            if modules.is_empty() {
                return Err(EngineError::invalid_usage("No modules to install"));
            }
        }
        let task_id = self.tasks.create(request).await?;
        info!(%task_id, "Install task created");
        Ok(task_id)
    }

    /// Wait for an install to finish. Cancelling `cancel` kills the process
    /// and fails with [`EngineError::Aborted`].
    pub async fn wait_install(&self, task_id: &TaskId, cancel: Option<CancellationToken>) -> Result<InstallOutput> {
        let Some(cancel) = cancel else {
            return self.tasks.wait_for_result(task_id).await;
        };

        tokio::select! {
            result = self.tasks.wait_for_result(task_id) => result,
            _ = cancel.cancelled() => {
                self.tasks.kill_task(task_id, CANCELLED_REASON).await?;
                Err(EngineError::Aborted(CANCELLED_REASON.to_string()))
            }
        }
    }

    pub async fn kill_install(&self, task_id: &TaskId, reason: &str) -> Result<()> {
        self.tasks.kill_task(task_id, reason).await
    }

    pub fn get_tasks(&self) -> Vec<TaskSnapshot<ProcessHandle>> {
        self.tasks.get_tasks()
    }

    async fn run(&self, request: InstallRequest, cancel: Option<CancellationToken>) -> Result<InstallOutput> {
        let description = request.describe();
        let task_id = self.start_install(request).await?;
        let host = &self.context.host;

        match self.wait_install(&task_id, cancel).await {
            Ok(output) => {
                host.append_output(&output.combined());
                host.show_message(
                    MessageKind::Info,
                    &format!("Installed {} with {}", description, output.manager),
                );
                Ok(output)
            }
            Err(e) => {
                warn!(%task_id, "Install of {} failed: {}", description, e);
                host.append_output(&e.to_string());
                Err(e)
            }
        }
    }

    /// Install `modules` and wait for the package manager to finish
    pub async fn install_modules(
        &self,
        modules: Vec<String>,
        options: InstallOptions,
        cancel: Option<CancellationToken>,
    ) -> Result<InstallOutput> {
        self.run(InstallRequest::Modules { modules, options }, cancel).await
    }

    /// Install one package, optionally pinned to `version`
    pub async fn install_package(
        &self,
        name: &str,
        version: Option<&str>,
        options: InstallOptions,
        cancel: Option<CancellationToken>,
    ) -> Result<InstallOutput> {
        let spec = match version {
            Some(version) => format!("{}@{}", name, version),
            None => name.to_string(),
        };
        self.install_modules(vec![spec], options, cancel).await
    }

    /// Install everything declared in the packages root's `package.json`
    pub async fn install_extension_dependencies(&self, cancel: Option<CancellationToken>) -> Result<InstallOutput> {
        self.run(InstallRequest::Dependencies, cancel).await
    }

    /// Published versions of `package`, newest first
    pub async fn list_versions(&self, package: &str) -> Result<Vec<String>> {
        Ok(sort_versions(self.registry.versions(package).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use userscript_config::{StaticConfigProvider, UserScriptConfig};

    #[derive(Default)]
    struct PromptHost {
        answer: bool,
        questions: Mutex<Vec<String>>,
        output: Mutex<Vec<String>>,
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HostApi for PromptHost {
        async fn read_file(&self, path: &Path) -> Result<String> {
            Ok(tokio::fs::read_to_string(path).await?)
        }

        async fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
            Ok(tokio::fs::write(path, contents).await?)
        }

        async fn dir_exists(&self, path: &Path) -> bool {
            path.is_dir()
        }

        async fn list_dirs(&self, _path: &Path) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn remove_dir(&self, path: &Path) -> Result<()> {
            Ok(tokio::fs::remove_dir_all(path).await?)
        }

        fn append_output(&self, text: &str) {
            self.output.lock().unwrap().push(text.to_string());
        }

        fn show_message(&self, _kind: MessageKind, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }

        async fn confirm(&self, message: &str) -> Result<bool> {
            self.questions.lock().unwrap().push(message.to_string());
            Ok(self.answer)
        }

        async fn pick(&self, _message: &str, _options: &[String]) -> Result<Option<usize>> {
            Ok(None)
        }

        fn active_document(&self) -> Option<PathBuf> {
            None
        }
    }

    struct FixedRegistry(Vec<&'static str>);

    #[async_trait]
    impl PackageRegistry for FixedRegistry {
        async fn versions(&self, _package: &str) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|v| v.to_string()).collect())
        }
    }

    fn missing_programs() -> PackageManagerPrograms {
        PackageManagerKind::ALL
            .into_iter()
            .fold(PackageManagerPrograms::new(), |programs, kind| {
                programs.with_program(kind, format!("/nonexistent/{}", kind))
            })
    }

    fn service(host: Arc<PromptHost>, programs: PackageManagerPrograms, root: Option<PathBuf>) -> PackageService {
        let mut config = UserScriptConfig::default();
        config.packages.root = root;
        PackageService::new(
            Arc::new(StaticConfigProvider::new(config)),
            host,
            Arc::new(FixedRegistry(vec!["1.0.0", "2.0.0", "1.0.0", "nightly"])),
            programs,
        )
    }

    #[tokio::test]
    async fn test_list_versions_sorted() {
        let service = service(Arc::new(PromptHost::default()), missing_programs(), None);
        assert_eq!(
            service.list_versions("anything").await.unwrap(),
            vec!["2.0.0", "1.0.0", "nightly"]
        );
    }

    #[tokio::test]
    async fn test_no_package_manager_rejects_task() {
        let host = Arc::new(PromptHost::default());
        let dir = tempfile::tempdir().unwrap();
        let service = service(host.clone(), missing_programs(), Some(dir.path().to_path_buf()));

        let err = service
            .install_modules(vec!["lodash".into()], InstallOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidUsage(ref m) if m.contains("No package manager")));
        assert!(host.questions.lock().unwrap().is_empty());
        assert!(service.get_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_local_install_needs_packages_root() {
        let service = service(Arc::new(PromptHost::default()), missing_programs(), None);
        let err = service
            .install_package("lodash", Some("4.17.21"), InstallOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidUsage(ref m) if m.contains("packages.root")));
    }

    #[tokio::test]
    async fn test_empty_module_list_is_invalid() {
        let service = service(Arc::new(PromptHost::default()), missing_programs(), None);
        let err = service
            .start_install(InstallRequest::Modules {
                modules: Vec::new(),
                options: InstallOptions::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidUsage(_)));
    }

    #[cfg(unix)]
    mod with_fake_managers {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_successful_install_is_logged_and_notified() {
            let dir = tempfile::tempdir().unwrap();
            let npm = fake(dir.path(), "npm", "echo \"npm $@\"\necho 'warn: peer' >&2");
            let host = Arc::new(PromptHost::default());
            let service = service(
                host.clone(),
                missing_programs().with_program(PackageManagerKind::Npm, npm),
                Some(dir.path().join("packages")),
            );

            let output = service
                .install_modules(vec!["lodash".into()], InstallOptions { global: false, dev: true }, None)
                .await
                .unwrap();
            assert_eq!(output.manager, PackageManagerKind::Npm);
            assert_eq!(output.stdout.trim(), "npm install -D lodash");
            assert!(dir.path().join("packages").is_dir());
            assert_eq!(host.output.lock().unwrap().as_slice(), ["npm install -D lodash\nwarn: peer"]);
            assert_eq!(host.messages.lock().unwrap().as_slice(), ["Installed lodash with npm"]);
        }

        #[tokio::test]
        async fn test_failed_install_rejects_with_output() {
            let dir = tempfile::tempdir().unwrap();
            let npm = fake(
                dir.path(),
                "npm",
                "if [ \"$1\" = --version ]; then exit 0; fi\necho 'E404 not found' >&2\nexit 1",
            );
            let service = service(
                Arc::new(PromptHost::default()),
                missing_programs().with_program(PackageManagerKind::Npm, npm),
                Some(dir.path().to_path_buf()),
            );

            let err = service
                .install_modules(vec!["no-such-pkg".into()], InstallOptions::default(), None)
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidUsage(ref m) if m.contains("E404")));
        }

        #[tokio::test]
        async fn test_alternate_manager_used_after_confirmation() {
            let dir = tempfile::tempdir().unwrap();
            let pnpm = fake(dir.path(), "pnpm", "echo \"pnpm $@\"");
            let host = Arc::new(PromptHost {
                answer: true,
                ..PromptHost::default()
            });
            let service = service(
                host.clone(),
                missing_programs().with_program(PackageManagerKind::Pnpm, pnpm),
                None,
            );

            let output = service
                .install_modules(vec!["typescript".into()], InstallOptions { global: true, dev: false }, None)
                .await
                .unwrap();
            assert_eq!(output.manager, PackageManagerKind::Pnpm);
            assert_eq!(output.stdout.trim(), "pnpm add -g typescript");
            assert_eq!(host.questions.lock().unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_declined_alternate_is_invalid_usage() {
            let dir = tempfile::tempdir().unwrap();
            let yarn = fake(dir.path(), "yarn", "echo ok");
            let service = service(
                Arc::new(PromptHost::default()),
                missing_programs().with_program(PackageManagerKind::Yarn, yarn),
                None,
            );

            let err = service
                .install_modules(vec!["typescript".into()], InstallOptions { global: true, dev: false }, None)
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidUsage(ref m) if m.contains("declined")));
        }

        #[tokio::test]
        async fn test_cancellation_kills_install() {
            let dir = tempfile::tempdir().unwrap();
            let npm = fake(
                dir.path(),
                "npm",
                "if [ \"$1\" = --version ]; then exit 0; fi\nexec sleep 30",
            );
            let service = service(
                Arc::new(PromptHost::default()),
                missing_programs().with_program(PackageManagerKind::Npm, npm),
                Some(dir.path().to_path_buf()),
            );

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                trigger.cancel();
            });

            let err = service
                .install_modules(vec!["slow".into()], InstallOptions::default(), Some(cancel))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Aborted(ref reason) if reason == CANCELLED_REASON));
            assert!(service.get_tasks().is_empty());
        }
    }
}
