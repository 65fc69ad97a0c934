//! Package installation for userscript
//!
//! Installs run a package manager (npm, yarn or pnpm) as a child process and
//! are tracked as tasks of a [`userscript_tasks::TaskService`], so each
//! install gets a task id, can run alongside others and can be killed.
//! Version listing and the `node_modules` roots scripts resolve packages
//! from are provided here as well.

pub mod installer;
pub mod process;
pub mod roots;
pub mod service;
pub mod versions;

pub use installer::{InstallOptions, InstallRequest, Installer, PackageManagerPrograms};
pub use process::{InstallOutput, ProcessHandle};
pub use roots::NodeModuleRoots;
pub use service::{PackageService, CANCELLED_REASON};
pub use versions::{sort_versions, NpmRegistry};
