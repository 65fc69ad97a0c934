//! Package manager strategies

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use userscript_config::PackageManagerKind;

/// Flags of a module install
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Install into the package manager's global location
    pub global: bool,
    /// Record as a development dependency
    pub dev: bool,
}

/// What an install task should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallRequest {
    /// Add the given module specs (`name` or `name@version`)
    Modules {
        modules: Vec<String>,
        options: InstallOptions,
    },
    /// Install every dependency declared in the packages root
    Dependencies,
}

impl InstallRequest {
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            InstallRequest::Modules {
                options: InstallOptions { global: true, .. },
                ..
            }
        )
    }

    pub fn describe(&self) -> String {
        match self {
            InstallRequest::Modules { modules, .. } => modules.join(", "),
            InstallRequest::Dependencies => "dependencies".to_string(),
        }
    }
}

/// Executable used for each package manager; the bare program name unless
/// overridden
#[derive(Debug, Clone, Default)]
pub struct PackageManagerPrograms {
    overrides: HashMap<PackageManagerKind, PathBuf>,
}

impl PackageManagerPrograms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, kind: PackageManagerKind, program: impl Into<PathBuf>) -> Self {
        self.overrides.insert(kind, program.into());
        self
    }

    pub fn program(&self, kind: PackageManagerKind) -> PathBuf {
        self.overrides
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(kind.program()))
    }

    /// A package manager is available when `<program> --version` succeeds
    pub async fn detect(&self, kind: PackageManagerKind) -> bool {
        let available = Command::new(self.program(kind))
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);
        debug!(manager = %kind, available, "Package manager detection");
        available
    }

    pub fn installer(&self, kind: PackageManagerKind) -> Installer {
        Installer {
            kind,
            program: self.program(kind),
        }
    }
}

/// One package manager ready to be invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installer {
    pub kind: PackageManagerKind,
    pub program: PathBuf,
}

impl Installer {
    /// Command line arguments carrying out `request`
    pub fn install_args(&self, request: &InstallRequest, registry: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        match request {
            InstallRequest::Dependencies => args.push("install".into()),
            InstallRequest::Modules { modules, options } => {
                match (self.kind, options.global) {
                    (PackageManagerKind::Npm, _) => args.push("install".into()),
                    (PackageManagerKind::Yarn, true) => args.extend(["global".to_string(), "add".to_string()]),
                    (PackageManagerKind::Yarn, false) | (PackageManagerKind::Pnpm, _) => args.push("add".into()),
                }
                if options.global && self.kind != PackageManagerKind::Yarn {
                    args.push("-g".into());
                }
                if options.dev && !options.global {
                    args.push("-D".into());
                }
                args.extend(modules.iter().cloned());
            }
        }
        if let Some(registry) = registry {
            args.push("--registry".into());
            args.push(registry.to_string());
        }
        args
    }
}
