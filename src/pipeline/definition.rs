// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Pipeline definition structures
//!
//! Defines the schema for .shipflow.yaml files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::registry::Tag;
use crate::source::CommitId;

/// Pipeline definition from .shipflow.yaml
///
/// Loaded once at startup and never mutated afterwards; execution state
/// lives in the report the orchestrator builds while running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline name
    pub name: String,

    /// Pipeline description
    #[serde(default)]
    pub description: Option<String>,

    /// Tracked source repository
    pub source: SourceConfig,

    /// Image registry to publish to
    #[serde(default)]
    pub registry: Option<RegistryConfig>,

    /// Key-value store for the latest-tag record
    #[serde(default)]
    pub store: Option<StoreConfig>,

    /// Global environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Stages in execution order
    pub stages: Vec<Stage>,
}

fn default_version() -> String {
    "1".to_string()
}

impl Pipeline {
    /// Load pipeline from a YAML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::ShipflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::ShipflowError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            }
        })?;

        Self::from_yaml(&content)
    }

    /// Parse pipeline from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, crate::ShipflowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize pipeline to YAML
    pub fn to_yaml(&self) -> Result<String, crate::ShipflowError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }
}

/// Tracked source repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Repository URL or local path
    pub repository: String,

    /// Branch to track
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Checkout directory (defaults to .shipflow/workdir)
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Image registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry host, e.g. registry.example.com
    pub url: String,

    /// Login username
    pub username: String,

    /// Name of the environment variable holding the login password
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

fn default_password_env() -> String {
    "SHIPFLOW_REGISTRY_PASSWORD".to_string()
}

/// Key-value store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store file path (defaults to the platform data directory)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// A single pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name (must be unique within pipeline)
    pub name: String,

    /// Stage description
    #[serde(default)]
    pub description: Option<String>,

    /// Actions in execution order
    pub actions: Vec<Action>,
}

/// A unit of work bound to a stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Poll the tracked branch and check out the new head commit
    Checkout,

    /// Run a build spec against the checked-out source
    Build {
        /// Build specification
        spec: BuildSpec,
    },
}

impl Action {
    /// Short label for reports and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::Build { .. } => "build",
        }
    }
}

/// Declarative build specification
///
/// Immutable ordered list of command descriptors plus the output files
/// the build is expected to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Commands in execution order
    pub commands: Vec<BuildCommand>,

    /// Output file patterns collected into the build artifact
    #[serde(default)]
    pub artifact_files: Vec<String>,

    /// Execution environment configuration
    #[serde(default)]
    pub environment: ExecutionEnv,
}

/// One command descriptor in a build spec
///
/// The build's shell sequence (tag, docker build, login, push, parameter
/// record) is expressed as typed descriptors interpreted in declared
/// order by the build executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BuildCommand {
    /// Generate the build tag; at most one per spec
    Tag {
        /// Architecture/runtime suffix appended to the timestamp
        suffix: String,
    },

    /// Run a shell command; the generated tag is available as $BUILD_TAG
    Shell {
        /// Shell command to run
        command: String,
    },

    /// Authenticate to the configured registry
    Login,

    /// Push an image labeled with the generated tag
    Push {
        /// Image name within the registry
        image: String,
    },

    /// Record the generated tag in the key-value store
    Record {
        /// Store key to overwrite
        key: String,
    },
}

impl BuildCommand {
    /// Short label for reports and logs
    pub fn label(&self) -> String {
        match self {
            Self::Tag { suffix } => format!("tag ({})", suffix),
            Self::Shell { command } => {
                let mut label: String = command.chars().take(48).collect();
                if command.chars().count() > 48 {
                    label.push('…');
                }
                label
            }
            Self::Login => "login".to_string(),
            Self::Push { image } => format!("push {}", image),
            Self::Record { key } => format!("record {}", key),
        }
    }
}

/// Execution environment for one build invocation
///
/// Privileged mode and the timeout are configuration attributes, never
/// runtime decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEnv {
    /// Required for container-image builds inside a container runner
    #[serde(default)]
    pub privileged: bool,

    /// Kill the command's process group after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Shell used for shell commands
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Environment variables for this build
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_shell() -> String {
    "bash".to_string()
}

impl Default for ExecutionEnv {
    fn default() -> Self {
        Self {
            privileged: false,
            timeout_secs: None,
            shell: default_shell(),
            env: HashMap::new(),
        }
    }
}

/// Stage execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Data handed from one stage to the next
///
/// Hand-off moves the value; the producing stage cannot touch it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Checked-out source snapshot
    Source {
        /// Commit the snapshot was taken at
        commit: CommitId,
        /// Branch the commit was observed on
        branch: String,
        /// Checkout location on disk
        path: PathBuf,
    },

    /// Files produced by a completed build
    BuildOutput {
        /// Tag the build was published under, if one was generated
        tag: Option<Tag>,
        /// Collected output files
        files: Vec<PathBuf>,
    },
}

impl Artifact {
    /// Commit id for source artifacts
    pub fn commit_id(&self) -> Option<&CommitId> {
        match self {
            Self::Source { commit, .. } => Some(commit),
            Self::BuildOutput { .. } => None,
        }
    }

    /// Checkout path for source artifacts
    pub fn source_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Source { path, .. } => Some(path.as_path()),
            Self::BuildOutput { .. } => None,
        }
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source { commit, branch, .. } => {
                write!(f, "source {}@{}", branch, commit.short())
            }
            Self::BuildOutput { tag, files } => match tag {
                Some(tag) => write!(f, "build output {} ({} file(s))", tag, files.len()),
                None => write!(f, "build output ({} file(s))", files.len()),
            },
        }
    }
}
