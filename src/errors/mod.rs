// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Error types
//!
//! shipflow reports failures with enough context to act on them: which
//! stage, which command index, and what kind of failure it was.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for shipflow operations
pub type ShipflowResult<T> = Result<T, ShipflowError>;

/// Main error type for shipflow
#[derive(Error, Debug, Diagnostic)]
pub enum ShipflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(shipflow::pipeline_not_found),
        help("Create a pipeline with 'shipflow init' or create .shipflow.yaml manually")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(shipflow::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Stage '{stage}' consumes an artifact that no earlier stage produces")]
    #[diagnostic(
        code(shipflow::missing_artifact_input),
        help("Add a checkout action in a stage before '{stage}'")
    )]
    MissingArtifactInput { stage: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Tool Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Tool '{tool}' not found")]
    #[diagnostic(code(shipflow::tool_not_found), help("{suggestion}"))]
    ToolNotFound { tool: String, suggestion: String },

    #[error("Failed to run '{tool}': {error}")]
    #[diagnostic(code(shipflow::tool_execution_failed))]
    ToolExecutionFailed {
        tool: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Source Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Source repository unavailable: {reason}")]
    #[diagnostic(code(shipflow::source_unavailable))]
    SourceUnavailable {
        repository: String,
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Branch '{branch}' not found in {repository}")]
    #[diagnostic(
        code(shipflow::branch_missing),
        help("Check the branch name in the pipeline's source section")
    )]
    BranchMissing { repository: String, branch: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Build Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("No artifact files matched pattern: {pattern}")]
    #[diagnostic(
        code(shipflow::no_artifact_files),
        help("Check that the build produces files matching '{pattern}'")
    )]
    NoArtifactFiles { pattern: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Publish Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Registry publish failed: {0}")]
    #[diagnostic(code(shipflow::publish_failed))]
    Publish(#[from] crate::registry::PublishError),

    // ─────────────────────────────────────────────────────────────────────────
    // Record Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Parameter store failure: {0}")]
    #[diagnostic(code(shipflow::record_failed))]
    Record(#[from] crate::store::StoreError),

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Execution failed: {message}")]
    #[diagnostic(code(shipflow::execution_failed))]
    ExecutionFailed {
        message: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // File Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(shipflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(shipflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(shipflow::yaml_error))]
    Yaml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(shipflow::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for ShipflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ShipflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: e.to_string(),
        }
    }
}

impl From<glob::PatternError> for ShipflowError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern {
            message: e.to_string(),
        }
    }
}

impl ShipflowError {
    /// Create a tool not found error with installation suggestion
    pub fn tool_not_found(tool: &str) -> Self {
        let suggestion = match tool {
            "git" => "Install git: https://git-scm.com/downloads".to_string(),
            "docker" => "Install Docker: https://docs.docker.com/get-docker/".to_string(),
            _ => format!("Install {} and ensure it's in your PATH", tool),
        };

        Self::ToolNotFound {
            tool: tool.to_string(),
            suggestion,
        }
    }

    /// Create a source unavailable error with context
    pub fn source_unavailable(repository: &str, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            repository: repository.to_string(),
            reason: reason.into(),
            help: Some("Check that the repository URL is reachable and the branch exists".into()),
        }
    }
}
