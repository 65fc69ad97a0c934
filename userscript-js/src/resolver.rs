//! Module resolution for `require` inside the sandbox

use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::trace;

const FILE_EXTENSIONS: &[&str] = &["js", "cjs", "json"];

/// Module found by [`ModuleResolver::resolve`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedModule {
    /// Absolute path of the module file
    pub path: PathBuf,
    /// Directory relative `require` calls inside the module resolve against
    pub dir: PathBuf,
    pub kind: ModuleKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Js,
    Json,
}

/// Resolves module ids the way Node does for CommonJS.
///
/// Relative and absolute ids resolve against the requiring file. Bare ids
/// are looked up in every `node_modules` above the requiring file and then
/// in the configured package roots, in order.
#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    roots: Vec<PathBuf>,
}

impl ModuleResolver {
    /// `roots` are `node_modules` directories, searched in the given order
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn resolve(&self, id: &str, from_dir: &Path) -> Option<ResolvedModule> {
        if id.is_empty() {
            return None;
        }

        let found = if is_path_like(id) {
            let base = normalize(&from_dir.join(id));
            resolve_file(&base).or_else(|| resolve_directory(&base))
        } else {
            self.candidate_dirs(from_dir).find_map(|dir| {
                let base = dir.join(id);
                trace!(module = id, candidate = %base.display(), "Probing module location");
                resolve_file(&base).or_else(|| resolve_directory(&base))
            })
        }?;

        // Relative data dirs or package roots still yield absolute cache keys
        let path = normalize(&std::path::absolute(&found).ok()?);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let kind = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ModuleKind::Json,
            _ => ModuleKind::Js,
        };
        Some(ResolvedModule { path, dir, kind })
    }

    fn candidate_dirs<'a>(&'a self, from_dir: &'a Path) -> impl Iterator<Item = PathBuf> + 'a {
        from_dir
            .ancestors()
            .filter(|dir| dir.file_name().map_or(true, |name| name != "node_modules"))
            .map(|dir| dir.join("node_modules"))
            .chain(self.roots.iter().cloned())
    }
}

fn is_path_like(id: &str) -> bool {
    id.starts_with("./") || id.starts_with("../") || id == "." || id == ".." || Path::new(id).is_absolute()
}

fn resolve_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }
    let file_name = base.file_name()?.to_str()?;
    FILE_EXTENSIONS
        .iter()
        .map(|ext| base.with_file_name(format!("{}.{}", file_name, ext)))
        .find(|candidate| candidate.is_file())
}

fn resolve_directory(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    let manifest = dir.join("package.json");
    if let Some(main) = std::fs::read_to_string(&manifest)
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
        .and_then(|json| json.get("main").and_then(|main| main.as_str()).map(str::to_string))
    {
        let target = normalize(&dir.join(main));
        if let Some(found) = resolve_file(&target).or_else(|| resolve_index(&target)) {
            return Some(found);
        }
    }

    resolve_index(dir)
}

fn resolve_index(dir: &Path) -> Option<PathBuf> {
    FILE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("index.{}", ext)))
        .find(|candidate| candidate.is_file())
}

/// Lexically remove `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
