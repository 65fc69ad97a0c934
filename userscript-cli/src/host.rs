//! Terminal stand-in for the host editor

use crate::output;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use userscript_core::{EngineError, Result};
use userscript_interfaces::{HostApi, HostModule, MessageKind};

/// Host backed by the local filesystem and the terminal
pub struct LocalHost {
    active_document: Option<PathBuf>,
    assume_yes: bool,
}

impl LocalHost {
    pub fn new(active_document: Option<PathBuf>, assume_yes: bool) -> Self {
        Self {
            active_document,
            assume_yes,
        }
    }

    async fn prompt(&self, question: &str) -> Result<String> {
        eprint!("{} ", question);
        std::io::stderr().flush()?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(line.trim().to_string())
    }
}

#[async_trait]
impl HostApi for LocalHost {
    async fn read_file(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(path, contents).await?)
    }

    async fn dir_exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    }

    async fn list_dirs(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::remove_dir_all(path).await?)
    }

    fn append_output(&self, text: &str) {
        println!("{}", text);
    }

    fn show_message(&self, kind: MessageKind, message: &str) {
        match kind {
            MessageKind::Info => output::print_info(message),
            MessageKind::Warning => output::print_warning(message),
            MessageKind::Error => output::print_error(message),
        }
    }

    async fn confirm(&self, message: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        let answer = self.prompt(&format!("{} [y/N]", message)).await?;
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }

    async fn pick(&self, message: &str, options: &[String]) -> Result<Option<usize>> {
        eprintln!("{}", message);
        for (index, option) in options.iter().enumerate() {
            eprintln!("  {}) {}", index + 1, option);
        }
        let answer = self.prompt("Choice (empty to dismiss):").await?;
        Ok(answer
            .parse::<usize>()
            .ok()
            .filter(|choice| (1..=options.len()).contains(choice))
            .map(|choice| choice - 1))
    }

    fn active_document(&self) -> Option<PathBuf> {
        self.active_document.clone()
    }
}

/// The object scripts get from `require("vscode")` (or the configured host
/// module id) when running from the terminal
pub struct TerminalHostModule {
    host: Arc<dyn HostApi>,
}

impl TerminalHostModule {
    const MEMBERS: [&'static str; 5] = [
        "showInformationMessage",
        "showWarningMessage",
        "showErrorMessage",
        "appendOutput",
        "activeDocument",
    ];

    pub fn new(host: Arc<dyn HostApi>) -> Self {
        Self { host }
    }
}

fn text_argument(member: &str, args: &[JsonValue]) -> Result<String> {
    match args.first() {
        Some(JsonValue::String(text)) => Ok(text.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(EngineError::invalid_usage(format!("{} expects a message argument", member))),
    }
}

impl HostModule for TerminalHostModule {
    fn members(&self) -> Vec<String> {
        Self::MEMBERS.iter().map(|member| member.to_string()).collect()
    }

    fn call(&self, member: &str, args: Vec<JsonValue>) -> Result<JsonValue> {
        match member {
            "showInformationMessage" => self.host.show_message(MessageKind::Info, &text_argument(member, &args)?),
            "showWarningMessage" => self.host.show_message(MessageKind::Warning, &text_argument(member, &args)?),
            "showErrorMessage" => self.host.show_message(MessageKind::Error, &text_argument(member, &args)?),
            "appendOutput" => self.host.append_output(&text_argument(member, &args)?),
            "activeDocument" => {
                return Ok(self
                    .host
                    .active_document()
                    .map(|path| JsonValue::String(path.display().to_string()))
                    .unwrap_or(JsonValue::Null))
            }
            other => {
                return Err(EngineError::not_supported(format!(
                    "The terminal host does not provide '{}'",
                    other
                )))
            }
        }
        Ok(JsonValue::Null)
    }
}
