//! Where scripts find installed packages

use crate::installer::PackageManagerPrograms;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;
use userscript_config::PackageManagerKind;
use userscript_interfaces::{ConfigProvider, PackageRoots};

/// `<packages.root>/node_modules` followed by the global package directories
/// of every package manager found on the host.
///
/// Global directories are looked up once and then reused.
pub struct NodeModuleRoots {
    config: Arc<dyn ConfigProvider>,
    programs: PackageManagerPrograms,
    global_roots: OnceCell<Vec<PathBuf>>,
}

impl NodeModuleRoots {
    pub fn new(config: Arc<dyn ConfigProvider>, programs: PackageManagerPrograms) -> Self {
        Self {
            config,
            programs,
            global_roots: OnceCell::new(),
        }
    }

    async fn query(&self, kind: PackageManagerKind) -> Option<PathBuf> {
        let args: &[&str] = match kind {
            PackageManagerKind::Npm | PackageManagerKind::Pnpm => &["root", "-g"],
            PackageManagerKind::Yarn => &["global", "dir"],
        };
        let output = Command::new(self.programs.program(kind))
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }

        let printed = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if printed.is_empty() {
            return None;
        }
        let dir = PathBuf::from(printed);
        Some(match kind {
            PackageManagerKind::Yarn => dir.join("node_modules"),
            _ => dir,
        })
    }

    async fn global_roots(&self) -> &[PathBuf] {
        self.global_roots
            .get_or_init(|| async {
                let mut roots = Vec::new();
                for kind in PackageManagerKind::ALL {
                    if let Some(root) = self.query(kind).await {
                        debug!(manager = %kind, root = %root.display(), "Global package root");
                        if !roots.contains(&root) {
                            roots.push(root);
                        }
                    }
                }
                roots
            })
            .await
    }
}

#[async_trait]
impl PackageRoots for NodeModuleRoots {
    async fn module_roots(&self) -> Vec<PathBuf> {
        let packages = self.config.configs().packages;
        let mut roots = Vec::new();
        if let Some(root) = packages.root {
            roots.push(root.join("node_modules"));
        }
        if packages.include_global_roots {
            for root in self.global_roots().await {
                if !roots.contains(root) {
                    roots.push(root.clone());
                }
            }
        }
        roots
    }
}
