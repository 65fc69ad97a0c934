//! Install orchestration with shell scripts standing in for package managers

#![cfg(unix)]

mod common;

use async_trait::async_trait;
use common::{fake_program, RecordingHost};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use userscript_config::{PackageManagerKind, StaticConfigProvider, UserScriptConfig};
use userscript_core::{EngineError, Result};
use userscript_interfaces::{MessageKind, PackageRegistry};
use userscript_packages::{InstallOptions, InstallRequest, PackageManagerPrograms, PackageService, CANCELLED_REASON};

struct NoRegistry;

#[async_trait]
impl PackageRegistry for NoRegistry {
    async fn versions(&self, package: &str) -> Result<Vec<String>> {
        Err(EngineError::invalid_usage(format!("no registry for {}", package)))
    }
}

/// Every manager points at a missing program unless overridden
fn programs_without_managers() -> PackageManagerPrograms {
    PackageManagerKind::ALL
        .into_iter()
        .fold(PackageManagerPrograms::new(), |programs, kind| {
            programs.with_program(kind, format!("/nonexistent/{}", kind))
        })
}

fn service(dir: &Path, host: Arc<RecordingHost>, programs: PackageManagerPrograms) -> PackageService {
    let mut config = UserScriptConfig::default();
    config.packages.root = Some(dir.join("packages"));
    PackageService::new(
        Arc::new(StaticConfigProvider::new(config)),
        host,
        Arc::new(NoRegistry),
        programs,
    )
}

/// npm stand-in: `slow` sleeps, anything else prints its arguments
const NPM: &str = r#"if [ "$1" = --version ]; then exit 0; fi
case "$*" in
  *slow*) exec sleep 30 ;;
esac
echo "installed $*""#;

fn modules(names: &[&str]) -> InstallRequest {
    InstallRequest::Modules {
        modules: names.iter().map(|name| name.to_string()).collect(),
        options: InstallOptions::default(),
    }
}

#[tokio::test]
async fn test_concurrent_installs_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let npm = fake_program(dir.path(), "npm", NPM);
    let service = service(
        dir.path(),
        Arc::new(RecordingHost::default()),
        programs_without_managers().with_program(PackageManagerKind::Npm, npm),
    );

    let slow = service.start_install(modules(&["slow-package"])).await.unwrap();
    let fast = service.start_install(modules(&["lodash", "dayjs"])).await.unwrap();
    assert_ne!(slow, fast);
    assert_eq!(service.get_tasks().len(), 2);

    service.kill_install(&slow, CANCELLED_REASON).await.unwrap();
    let killed = service.wait_install(&slow, None).await.unwrap_err();
    assert!(matches!(killed, EngineError::Aborted(ref reason) if reason == CANCELLED_REASON));

    let output = tokio::time::timeout(Duration::from_secs(10), service.wait_install(&fast, None))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output.stdout.trim(), "installed install lodash dayjs");
    assert!(service.get_tasks().is_empty());
}

#[tokio::test]
async fn test_kill_unknown_install_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), Arc::new(RecordingHost::default()), programs_without_managers());
    service
        .kill_install(&"nope1234".into(), CANCELLED_REASON)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_dependencies_install_in_packages_root() {
    let dir = tempfile::tempdir().unwrap();
    let npm = fake_program(
        dir.path(),
        "npm",
        r#"if [ "$1" = --version ]; then exit 0; fi
echo "$* in $(basename "$PWD")""#,
    );
    let host = Arc::new(RecordingHost::default());
    let service = service(
        dir.path(),
        host.clone(),
        programs_without_managers().with_program(PackageManagerKind::Npm, npm),
    );

    let output = service.install_extension_dependencies(None).await.unwrap();
    assert_eq!(output.stdout.trim(), "install in packages");
    assert_eq!(host.output.lock().unwrap().as_slice(), ["install in packages"]);
    assert_eq!(
        host.messages.lock().unwrap().as_slice(),
        [(MessageKind::Info, "Installed dependencies with npm".to_string())]
    );
}

#[tokio::test]
async fn test_fallback_manager_needs_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let yarn = fake_program(dir.path(), "yarn", r#"echo "yarn $*""#);
    let host = Arc::new(RecordingHost::default());
    *host.confirm_answer.lock().unwrap() = true;
    let service = service(
        dir.path(),
        host.clone(),
        programs_without_managers().with_program(PackageManagerKind::Yarn, yarn),
    );

    let output = service
        .install_package("left-pad", Some("1.3.0"), InstallOptions { global: false, dev: true }, None)
        .await
        .unwrap();
    assert_eq!(output.manager, PackageManagerKind::Yarn);
    assert_eq!(output.stdout.trim(), "yarn add -D left-pad@1.3.0");

    let confirmations = host.confirmations.lock().unwrap().clone();
    assert_eq!(confirmations.len(), 1);
    assert!(confirmations[0].contains("npm"));
    assert!(confirmations[0].contains("yarn"));
}

#[tokio::test]
async fn test_no_manager_available_fails_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), Arc::new(RecordingHost::default()), programs_without_managers());

    let task_id = service.start_install(modules(&["lodash"])).await.unwrap();
    let err = service.wait_install(&task_id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidUsage(_)));
    assert!(service.get_tasks().is_empty());
}
