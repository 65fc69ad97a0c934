//! Published package versions

use crate::installer::PackageManagerPrograms;
use async_trait::async_trait;
use semver::Version;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::process::Stdio;
use tokio::process::Command;
use userscript_config::PackageManagerKind;
use userscript_core::{EngineError, Result};
use userscript_interfaces::PackageRegistry;

/// Compare strings chunk by chunk, runs of digits numerically
fn numeric_aware_cmp(a: &str, b: &str) -> Ordering {
    fn chunks(s: &str) -> Vec<(bool, &str)> {
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut digits = None;
        for (i, c) in s.char_indices() {
            let is_digit = c.is_ascii_digit();
            if digits.is_some_and(|d| d != is_digit) {
                chunks.push((digits.unwrap_or(false), &s[start..i]));
                start = i;
            }
            digits = Some(is_digit);
        }
        if start < s.len() {
            chunks.push((digits.unwrap_or(false), &s[start..]));
        }
        chunks
    }

    let (a_chunks, b_chunks) = (chunks(a), chunks(b));
    for ((a_digits, a_chunk), (b_digits, b_chunk)) in a_chunks.iter().zip(b_chunks.iter()) {
        let ordering = if *a_digits && *b_digits {
            let (a_trimmed, b_trimmed) = (a_chunk.trim_start_matches('0'), b_chunk.trim_start_matches('0'));
            a_trimmed
                .len()
                .cmp(&b_trimmed.len())
                .then_with(|| a_trimmed.cmp(b_trimmed))
        } else {
            a_chunk.cmp(b_chunk)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a_chunks.len().cmp(&b_chunks.len())
}

fn parse(version: &str) -> Option<Version> {
    Version::parse(version.trim_start_matches('v')).ok()
}

/// De-duplicate and order versions newest first.
///
/// Valid semver versions come first in semver order; anything else follows,
/// ordered by numeric-aware comparison.
pub fn sort_versions(versions: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut versions: Vec<String> = versions
        .into_iter()
        .map(|version| version.trim().to_string())
        .filter(|version| !version.is_empty() && seen.insert(version.clone()))
        .collect();

    versions.sort_by(|a, b| match (parse(a), parse(b)) {
        (Some(a_version), Some(b_version)) => b_version.cmp(&a_version).then_with(|| b.cmp(a)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => numeric_aware_cmp(b, a),
    });
    versions
}

/// Registry queries through `npm view`
pub struct NpmRegistry {
    programs: PackageManagerPrograms,
    registry: Option<String>,
}

impl NpmRegistry {
    pub fn new(programs: PackageManagerPrograms, registry: Option<String>) -> Self {
        Self { programs, registry }
    }
}

#[async_trait]
impl PackageRegistry for NpmRegistry {
    async fn versions(&self, package: &str) -> Result<Vec<String>> {
        let mut command = Command::new(self.programs.program(PackageManagerKind::Npm));
        command
            .args(["view", package, "versions", "--json"])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(registry) = &self.registry {
            command.args(["--registry", registry]);
        }

        let output = command.output().await.map_err(|e| {
            EngineError::invalid_usage(format!("Failed to run npm to list versions of '{}': {}", package, e))
        })?;
        if !output.status.success() {
            return Err(EngineError::invalid_usage(format!(
                "Cannot list versions of '{}':\n{}",
                package,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // A package with a single version is printed as a bare string
        match serde_json::from_slice::<JsonValue>(&output.stdout)? {
            JsonValue::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()),
            JsonValue::String(version) => Ok(vec![version]),
            other => Err(EngineError::internal(format!(
                "Unexpected npm view output for '{}': {}",
                package, other
            ))),
        }
    }
}
