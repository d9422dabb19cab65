// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Command execution
//!
//! Shell commands run through the [`CommandRunner`] seam so the build
//! executor can be exercised without spawning processes. The real runner
//! places each command in its own process group; a timeout kills the
//! whole group, children included.

mod build;

pub use build::{BuildExecutor, BuildFailure, BuildFailureKind, BuildResult, StepReport};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::{ShipflowError, ShipflowResult};
use crate::pipeline::ExecutionEnv;

/// Result of running one command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// How the command ended
    pub status: CommandStatus,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Wall-clock duration
    pub duration: Duration,
}

/// Terminal state of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Process exited with this code
    Exited(i32),

    /// Process group was killed after the configured timeout
    TimedOut,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        matches!(self.status, CommandStatus::Exited(0))
    }

    /// Exit code, with timeout treated as a non-zero exit
    pub fn exit_code(&self) -> i32 {
        match self.status {
            CommandStatus::Exited(code) => code,
            CommandStatus::TimedOut => -1,
        }
    }
}

/// Seam for running shell-level commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` in `cwd` with the given variables
    ///
    /// `environment` supplies the shell, timeout, and privilege
    /// configuration for the invocation.
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        vars: &HashMap<String, String>,
        environment: &ExecutionEnv,
    ) -> ShipflowResult<CommandOutput>;
}

/// Runs commands via `<shell> -c`
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        vars: &HashMap<String, String>,
        environment: &ExecutionEnv,
    ) -> ShipflowResult<CommandOutput> {
        if environment.privileged {
            // A container-based runner maps this to --privileged; the
            // plain shell runner already runs at the caller's privilege.
            debug!("privileged execution requested");
        }

        let start = Instant::now();

        let mut cmd = Command::new(&environment.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(cwd)
            .envs(vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| ShipflowError::ToolExecutionFailed {
            tool: environment.shell.clone(),
            error: e.to_string(),
            help: Some(format!("Shell '{}' may not be available", environment.shell)),
        })?;

        let pid = child.id();

        let wait = child.wait_with_output();
        let output = match environment.timeout_secs {
            None => wait.await?,
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), wait).await {
                Ok(output) => output?,
                Err(_) => {
                    kill_process_group(pid);
                    warn!(command, secs, "command timed out, process group killed");
                    return Ok(CommandOutput {
                        status: CommandStatus::TimedOut,
                        stdout: String::new(),
                        stderr: format!("killed after {}s timeout", secs),
                        duration: start.elapsed(),
                    });
                }
            },
        };

        Ok(CommandOutput {
            status: CommandStatus::Exited(output.status.code().unwrap_or(-1)),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
        })
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // The child was started as its own group leader, so a negative
        // pid reaches the command and everything it spawned.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Resolve artifact glob patterns to file paths
pub fn resolve_artifact_files(
    patterns: &[String],
    base_dir: &Path,
) -> ShipflowResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let full_pattern = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            base_dir.join(pattern).to_string_lossy().to_string()
        };

        let matches: Vec<_> = glob::glob(&full_pattern)
            .map_err(|e| ShipflowError::GlobPattern {
                message: e.to_string(),
            })?
            .filter_map(Result::ok)
            .collect();

        if matches.is_empty() {
            return Err(ShipflowError::NoArtifactFiles {
                pattern: pattern.clone(),
            });
        }

        files.extend(matches);
    }

    Ok(files)
}
