//! Package manager child processes

use crate::installer::Installer;
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use userscript_config::PackageManagerKind;
use userscript_core::{EngineError, Result};
use userscript_tasks::TaskSettler;

/// Handle of a running install, kept by the task service so the process can
/// be killed
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub manager: PackageManagerKind,
    cancel: CancellationToken,
}

impl ProcessHandle {
    /// Ask the supervisor to kill the process. Does not wait for it to exit.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Everything a successful install printed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallOutput {
    pub manager: PackageManagerKind,
    pub stdout: String,
    pub stderr: String,
}

impl InstallOutput {
    /// stdout followed by stderr, as shown in the host output channel
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buffer).await {
            warn!("Failed to read package manager output: {}", e);
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// A package manager process that has been spawned but not yet supervised
pub(crate) struct RunningInstall {
    child: Child,
    handle: ProcessHandle,
    command_line: String,
}

/// Start `installer` with `args` in `cwd`
pub(crate) fn spawn_install(installer: &Installer, args: Vec<String>, cwd: Option<&Path>) -> Result<RunningInstall> {
    let command_line = format!("{} {}", installer.kind, args.join(" "));

    let mut command = Command::new(&installer.program);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let child = command.spawn().map_err(|e| {
        EngineError::invalid_usage(format!("Failed to start `{}`: {}", command_line, e))
    })?;

    let handle = ProcessHandle {
        pid: child.id(),
        manager: installer.kind,
        cancel: CancellationToken::new(),
    };
    Ok(RunningInstall {
        child,
        handle,
        command_line,
    })
}

impl RunningInstall {
    /// Settle the task once the process exits and return its handle.
    ///
    /// A process killed through its handle never settles the task; the task
    /// service has already aborted it.
    pub(crate) fn supervise(self, settler: TaskSettler<ProcessHandle, InstallOutput>) -> ProcessHandle {
        let RunningInstall {
            mut child,
            handle,
            command_line,
        } = self;
        info!(task_id = %settler.task_id(), pid = ?handle.pid, "Started `{}`", command_line);

        let cancel = handle.cancel.clone();
        let manager = handle.manager;
        let stdout = tokio::spawn(read_all(child.stdout.take()));
        let stderr = tokio::spawn(read_all(child.stderr.take()));

        tokio::spawn(async move {
            let task_id = settler.task_id().clone();
            let status = tokio::select! {
                status = child.wait() => status,
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        warn!(%task_id, "Failed to kill `{}`: {}", command_line, e);
                    }
                    debug!(%task_id, "Killed `{}`", command_line);
                    return;
                }
            };

            let output = InstallOutput {
                manager,
                stdout: stdout.await.unwrap_or_default(),
                stderr: stderr.await.unwrap_or_default(),
            };
            match status {
                Ok(status) if status.success() => {
                    debug!(%task_id, "`{}` finished", command_line);
                    settler.resolve(output);
                }
                Ok(status) => {
                    settler.reject(EngineError::invalid_usage(format!(
                        "`{}` failed ({}):\n{}",
                        command_line,
                        status,
                        output.combined()
                    )));
                }
                Err(e) => {
                    settler.reject(e.into());
                }
            }
        });

        handle
    }
}
