//! Package registry interface

use async_trait::async_trait;
use userscript_core::Result;

/// Read-only package registry queries
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Every published version of `package`, in registry order
    async fn versions(&self, package: &str) -> Result<Vec<String>>;
}

/// `node_modules` directories scripts may `require` packages from
#[async_trait]
pub trait PackageRoots: Send + Sync {
    /// Candidate directories in search order
    async fn module_roots(&self) -> Vec<std::path::PathBuf>;
}
