// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Source repository access
//!
//! The pipeline depends on a narrow repository interface: resolve the
//! head of a branch, check out a commit. The git implementation shells
//! out to the git CLI.

mod watcher;

pub use watcher::SourceWatcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

use crate::errors::{ShipflowError, ShipflowResult};

/// Identifier of one commit on the tracked branch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for logs
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }

    /// Whether the id looks like a git object hash
    pub fn is_well_formed(&self) -> bool {
        static RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = RE.get_or_init(|| regex::Regex::new(r"^[0-9a-f]{7,40}$").unwrap());
        re.is_match(&self.0)
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Narrow interface to the source-control system
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Resolve the head commit of a branch
    async fn head_commit(&self, branch: &str) -> ShipflowResult<CommitId>;

    /// Check out a commit and return the snapshot location
    async fn checkout(&self, commit: &CommitId) -> ShipflowResult<PathBuf>;

    /// Human-readable repository identity for logs and errors
    fn describe(&self) -> String;
}

/// Git CLI implementation of [`SourceRepository`]
pub struct GitRepository {
    remote: String,
    workdir: PathBuf,
}

impl GitRepository {
    pub fn new(remote: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            remote: remote.into(),
            workdir: workdir.into(),
        }
    }

    /// Check that the git CLI is installed
    pub fn check_available() -> ShipflowResult<()> {
        which::which("git").map_err(|_| ShipflowError::tool_not_found("git"))?;
        Ok(())
    }

    async fn run_git(&self, args: &[&str]) -> ShipflowResult<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ShipflowError::ToolExecutionFailed {
                tool: "git".to_string(),
                error: e.to_string(),
                help: Some("git may not be installed or not in PATH".to_string()),
            })?;
        Ok(output)
    }
}

#[async_trait]
impl SourceRepository for GitRepository {
    async fn head_commit(&self, branch: &str) -> ShipflowResult<CommitId> {
        let refspec = format!("refs/heads/{}", branch);
        let output = self
            .run_git(&["ls-remote", &self.remote, &refspec])
            .await?;

        if !output.status.success() {
            return Err(ShipflowError::source_unavailable(
                &self.remote,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let head = stdout
            .split_whitespace()
            .next()
            .map(CommitId::new)
            .ok_or_else(|| ShipflowError::BranchMissing {
                repository: self.remote.clone(),
                branch: branch.to_string(),
            })?;

        Ok(head)
    }

    async fn checkout(&self, commit: &CommitId) -> ShipflowResult<PathBuf> {
        let workdir = self.workdir.to_string_lossy().to_string();

        if !self.workdir.join(".git").exists() {
            if let Some(parent) = self.workdir.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let output = self.run_git(&["clone", &self.remote, &workdir]).await?;
            if !output.status.success() {
                return Err(ShipflowError::source_unavailable(
                    &self.remote,
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ));
            }
        } else {
            let output = self
                .run_git(&["-C", &workdir, "fetch", "--quiet", "origin"])
                .await?;
            if !output.status.success() {
                return Err(ShipflowError::source_unavailable(
                    &self.remote,
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ));
            }
        }

        let output = self
            .run_git(&["-C", &workdir, "checkout", "--quiet", "--detach", commit.as_str()])
            .await?;
        if !output.status.success() {
            return Err(ShipflowError::source_unavailable(
                &self.remote,
                format!(
                    "checkout of {} failed: {}",
                    commit.short(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        Ok(self.workdir.clone())
    }

    fn describe(&self) -> String {
        self.remote.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_id_short() {
        let id = CommitId::new("0123456789abcdef0123456789abcdef01234567");
        assert_eq!(id.short(), "01234567");

        let tiny = CommitId::new("abc");
        assert_eq!(tiny.short(), "abc");
    }

    #[test]
    fn test_commit_id_well_formed() {
        assert!(CommitId::new("0123456789abcdef0123456789abcdef01234567").is_well_formed());
        assert!(CommitId::new("abc1234").is_well_formed());
        assert!(!CommitId::new("not a hash").is_well_formed());
        assert!(!CommitId::new("ABC1234").is_well_formed());
    }
}
