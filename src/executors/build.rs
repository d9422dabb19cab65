// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Build executor
//!
//! Interprets a build spec's command descriptors in declared order
//! against a checked-out source artifact. Execution halts at the first
//! failing command; the failure carries the command index and captured
//! output. State is scoped to the invocation: the generated tag and the
//! registry session never leak between builds.

use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::errors::{ShipflowError, ShipflowResult};
use crate::pipeline::{Artifact, BuildCommand, BuildSpec};
use crate::registry::{self, PublishError, Registry, Session, Tag, TagScheme};
use crate::store::{ParameterStore, StoreError};

use super::{resolve_artifact_files, CommandRunner, CommandStatus};

/// Build executor over a command runner, registry, and parameter store
pub struct BuildExecutor {
    runner: Box<dyn CommandRunner>,
    registry: Option<Box<dyn Registry>>,
    store: Option<Box<dyn ParameterStore>>,
}

impl BuildExecutor {
    pub fn new(runner: Box<dyn CommandRunner>) -> Self {
        Self {
            runner,
            registry: None,
            store: None,
        }
    }

    /// Set the registry used by login/push commands
    pub fn with_registry(mut self, registry: Box<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the store used by record commands
    pub fn with_store(mut self, store: Box<dyn ParameterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Execute a build spec against a source artifact
    ///
    /// The input artifact is consumed; it belongs to this invocation once
    /// the producing stage hands it off.
    pub async fn execute(
        &self,
        spec: &BuildSpec,
        input: Artifact,
        global_env: &HashMap<String, String>,
    ) -> ShipflowResult<BuildResult> {
        let workdir = input
            .source_path()
            .ok_or_else(|| ShipflowError::ExecutionFailed {
                message: "build input must be a source artifact".to_string(),
                help: None,
            })?
            .to_path_buf();

        let start = Instant::now();

        // Invocation-scoped state
        let mut vars = global_env.clone();
        vars.extend(spec.environment.env.clone());
        let mut tag: Option<Tag> = None;
        let mut session: Option<Session> = None;
        let mut steps: Vec<StepReport> = Vec::new();

        for (index, command) in spec.commands.iter().enumerate() {
            let step_start = Instant::now();
            debug!(index, command = %command.label(), "running build command");

            let failure = match command {
                BuildCommand::Tag { suffix } => {
                    if tag.is_some() {
                        // Validation rejects this; regenerating mid-invocation
                        // would hand later commands a different identity.
                        return Err(ShipflowError::InvalidPipeline {
                            reason: "build tag generated twice in one invocation".to_string(),
                            help: None,
                        });
                    }
                    let generated = registry::generate(Utc::now(), &TagScheme::new(suffix.as_str()));
                    info!(tag = %generated, "build tag generated");
                    vars.insert("BUILD_TAG".to_string(), generated.to_string());
                    tag = Some(generated);
                    None
                }

                BuildCommand::Shell { command: line } => {
                    let output = self
                        .runner
                        .run(line, &workdir, &vars, &spec.environment)
                        .await?;
                    match output.status {
                        CommandStatus::Exited(0) => None,
                        CommandStatus::Exited(code) => Some(BuildFailure {
                            index,
                            command: command.label(),
                            kind: BuildFailureKind::CommandFailed { exit_code: code },
                            stdout: output.stdout,
                            stderr: output.stderr,
                        }),
                        CommandStatus::TimedOut => Some(BuildFailure {
                            index,
                            command: command.label(),
                            kind: BuildFailureKind::Timeout {
                                seconds: spec.environment.timeout_secs.unwrap_or(0),
                            },
                            stdout: output.stdout,
                            stderr: output.stderr,
                        }),
                    }
                }

                BuildCommand::Login => {
                    let registry = self.registry.as_ref().ok_or_else(|| {
                        ShipflowError::ExecutionFailed {
                            message: "login command without a configured registry".to_string(),
                            help: Some("Add a registry section to the pipeline".to_string()),
                        }
                    })?;
                    match registry.login().await {
                        Ok(s) => {
                            session = Some(s);
                            None
                        }
                        Err(e) => Some(BuildFailure::publish(index, command.label(), e)),
                    }
                }

                BuildCommand::Push { image } => {
                    let registry = self.registry.as_ref().ok_or_else(|| {
                        ShipflowError::ExecutionFailed {
                            message: "push command without a configured registry".to_string(),
                            help: Some("Add a registry section to the pipeline".to_string()),
                        }
                    })?;
                    let current_session =
                        session.as_ref().ok_or_else(|| ShipflowError::ExecutionFailed {
                            message: "push command before login".to_string(),
                            help: None,
                        })?;
                    let current_tag =
                        tag.as_ref().ok_or_else(|| ShipflowError::ExecutionFailed {
                            message: "push command before tag generation".to_string(),
                            help: None,
                        })?;
                    match registry.push(current_session, image, current_tag).await {
                        Ok(()) => None,
                        Err(e) => Some(BuildFailure::publish(index, command.label(), e)),
                    }
                }

                BuildCommand::Record { key } => {
                    let store = self.store.as_ref().ok_or_else(|| {
                        ShipflowError::ExecutionFailed {
                            message: "record command without a configured store".to_string(),
                            help: None,
                        }
                    })?;
                    let current_tag =
                        tag.as_ref().ok_or_else(|| ShipflowError::ExecutionFailed {
                            message: "record command before tag generation".to_string(),
                            help: None,
                        })?;
                    match store.put(key, current_tag.as_str(), true).await {
                        Ok(()) => None,
                        Err(e) => Some(BuildFailure {
                            index,
                            command: command.label(),
                            kind: BuildFailureKind::Record(e),
                            stdout: String::new(),
                            stderr: String::new(),
                        }),
                    }
                }
            };

            match failure {
                None => steps.push(StepReport {
                    index,
                    label: command.label(),
                    success: true,
                    duration: step_start.elapsed(),
                }),
                Some(failure) => {
                    warn!(index, command = %failure.command, "build command failed, remaining commands skipped");
                    steps.push(StepReport {
                        index,
                        label: command.label(),
                        success: false,
                        duration: step_start.elapsed(),
                    });
                    return Ok(BuildResult {
                        steps,
                        failure: Some(failure),
                        tag,
                        artifact: None,
                        duration: start.elapsed(),
                    });
                }
            }
        }

        let files = if spec.artifact_files.is_empty() {
            Vec::new()
        } else {
            resolve_artifact_files(&spec.artifact_files, &workdir)?
        };

        Ok(BuildResult {
            artifact: Some(Artifact::BuildOutput {
                tag: tag.clone(),
                files,
            }),
            steps,
            failure: None,
            tag,
            duration: start.elapsed(),
        })
    }
}

/// Result of one build invocation
#[derive(Debug)]
pub struct BuildResult {
    /// Per-command outcomes, in execution order
    pub steps: Vec<StepReport>,

    /// First failing command, if any
    pub failure: Option<BuildFailure>,

    /// Tag generated during this invocation
    pub tag: Option<Tag>,

    /// Output artifact on success
    pub artifact: Option<Artifact>,

    /// Total wall-clock duration
    pub duration: Duration,
}

impl BuildResult {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Outcome of one executed command
#[derive(Debug, Clone)]
pub struct StepReport {
    pub index: usize,
    pub label: String,
    pub success: bool,
    pub duration: Duration,
}

/// First failing command of a build
#[derive(Debug)]
pub struct BuildFailure {
    /// Index of the failing command in the spec
    pub index: usize,

    /// Label of the failing command
    pub command: String,

    /// Failure classification
    pub kind: BuildFailureKind,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,
}

impl BuildFailure {
    fn publish(index: usize, command: String, error: PublishError) -> Self {
        Self {
            index,
            command,
            kind: BuildFailureKind::Publish(error),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

impl std::fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "command {} ({}): {}", self.index, self.command, self.kind)
    }
}

/// Classification of a build failure
#[derive(Debug)]
pub enum BuildFailureKind {
    /// Shell command exited non-zero
    CommandFailed { exit_code: i32 },

    /// Shell command killed after the configured timeout
    Timeout { seconds: u64 },

    /// Registry login or push failed
    Publish(PublishError),

    /// Key-value store write failed; the image may already be pushed
    Record(StoreError),
}

impl std::fmt::Display for BuildFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommandFailed { exit_code } => write!(f, "exit code {}", exit_code),
            Self::Timeout { seconds } => write!(f, "timed out after {}s", seconds),
            Self::Publish(e) => write!(f, "{}", e),
            Self::Record(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use crate::executors::{CommandOutput, ShellRunner};
    use crate::pipeline::ExecutionEnv;
    use crate::source::CommitId;

    fn source_artifact(path: &Path) -> Artifact {
        Artifact::Source {
            commit: CommitId::new("aaa1111"),
            branch: "main".to_string(),
            path: path.to_path_buf(),
        }
    }

    fn publish_spec() -> BuildSpec {
        BuildSpec {
            commands: vec![
                BuildCommand::Tag {
                    suffix: "arm64".into(),
                },
                BuildCommand::Shell {
                    command: "docker build".into(),
                },
                BuildCommand::Login,
                BuildCommand::Push {
                    image: "craftci".into(),
                },
                BuildCommand::Record {
                    key: "latest-tag".into(),
                },
            ],
            artifact_files: vec![],
            environment: ExecutionEnv::default(),
        }
    }

    /// Runner that fails commands containing a marker substring
    struct FakeRunner {
        fail_on: Option<String>,
        calls: Arc<Mutex<Vec<(String, PathBuf)>>>,
    }

    impl FakeRunner {
        fn new() -> (Self, Arc<Mutex<Vec<(String, PathBuf)>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    fail_on: None,
                    calls: calls.clone(),
                },
                calls,
            )
        }

        fn failing_on(marker: &str) -> Self {
            Self {
                fail_on: Some(marker.to_string()),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            command: &str,
            cwd: &Path,
            _vars: &HashMap<String, String>,
            _environment: &ExecutionEnv,
        ) -> ShipflowResult<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), cwd.to_path_buf()));

            let fails = self
                .fail_on
                .as_ref()
                .is_some_and(|marker| command.contains(marker));

            Ok(CommandOutput {
                status: CommandStatus::Exited(if fails { 1 } else { 0 }),
                stdout: String::new(),
                stderr: if fails { "boom".into() } else { String::new() },
                duration: Duration::from_millis(1),
            })
        }
    }

    #[derive(Clone)]
    struct FakeRegistry {
        reject_push: bool,
        pushed: Arc<Mutex<Vec<String>>>,
    }

    impl FakeRegistry {
        fn new() -> Self {
            Self {
                reject_push: false,
                pushed: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn rejecting() -> Self {
            Self {
                reject_push: true,
                pushed: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Registry for FakeRegistry {
        async fn login(&self) -> Result<Session, PublishError> {
            Ok(Session::new("registry.example.com"))
        }

        async fn push(
            &self,
            _session: &Session,
            image: &str,
            tag: &Tag,
        ) -> Result<(), PublishError> {
            if self.reject_push {
                return Err(PublishError::PushRejected {
                    image: image.to_string(),
                    detail: "tag already exists".into(),
                });
            }
            self.pushed
                .lock()
                .unwrap()
                .push(format!("{}:{}", image, tag));
            Ok(())
        }
    }

    #[derive(Clone)]
    struct MemoryStore {
        map: Arc<Mutex<HashMap<String, String>>>,
        unavailable: bool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                map: Arc::new(Mutex::new(HashMap::new())),
                unavailable: false,
            }
        }

        fn unreachable() -> Self {
            Self {
                map: Arc::new(Mutex::new(HashMap::new())),
                unavailable: true,
            }
        }
    }

    #[async_trait]
    impl ParameterStore for MemoryStore {
        async fn put(&self, key: &str, value: &str, _overwrite: bool) -> Result<(), StoreError> {
            if self.unavailable {
                return Err(StoreError::Unavailable {
                    reason: "connection refused".into(),
                });
            }
            self.map
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self.map.lock().unwrap().get(key).cloned())
        }
    }

    #[tokio::test]
    async fn test_all_commands_succeed_records_tag() {
        let (runner, _) = FakeRunner::new();
        let registry = FakeRegistry::new();
        let store = MemoryStore::new();

        let executor = BuildExecutor::new(Box::new(runner))
            .with_registry(Box::new(registry.clone()))
            .with_store(Box::new(store.clone()));

        let result = executor
            .execute(&publish_spec(), source_artifact(Path::new(".")), &HashMap::new())
            .await
            .unwrap();

        assert!(result.success());
        let tag = result.tag.as_ref().expect("tag generated");
        assert!(tag.as_str().ends_with("arm64"));
        assert_eq!(tag.as_str().len(), 14 + "arm64".len());

        // Recorded value is exactly the pushed tag
        let recorded = store.get("latest-tag").await.unwrap().unwrap();
        assert_eq!(recorded, tag.as_str());
        let pushed = registry.pushed.lock().unwrap();
        assert_eq!(pushed.as_slice(), [format!("craftci:{}", tag)]);
    }

    #[tokio::test]
    async fn test_rejected_push_fails_and_store_is_untouched() {
        let (runner, _) = FakeRunner::new();
        let store = MemoryStore::new();
        store.put("latest-tag", "previous", true).await.unwrap();

        let executor = BuildExecutor::new(Box::new(runner))
            .with_registry(Box::new(FakeRegistry::rejecting()))
            .with_store(Box::new(store.clone()));

        let result = executor
            .execute(&publish_spec(), source_artifact(Path::new(".")), &HashMap::new())
            .await
            .unwrap();

        assert!(!result.success());
        let failure = result.failure.unwrap();
        assert_eq!(failure.index, 3);
        assert!(matches!(
            failure.kind,
            BuildFailureKind::Publish(PublishError::PushRejected { .. })
        ));

        // Record never ran
        assert_eq!(
            store.get("latest-tag").await.unwrap().as_deref(),
            Some("previous")
        );
    }

    #[tokio::test]
    async fn test_store_unavailable_fails_after_push() {
        let (runner, _) = FakeRunner::new();
        let registry = FakeRegistry::new();

        let executor = BuildExecutor::new(Box::new(runner))
            .with_registry(Box::new(registry.clone()))
            .with_store(Box::new(MemoryStore::unreachable()));

        let result = executor
            .execute(&publish_spec(), source_artifact(Path::new(".")), &HashMap::new())
            .await
            .unwrap();

        assert!(!result.success());
        let failure = result.failure.unwrap();
        assert_eq!(failure.index, 4);
        assert!(matches!(
            failure.kind,
            BuildFailureKind::Record(StoreError::Unavailable { .. })
        ));

        // Documented inconsistency: the image is already in the registry
        assert_eq!(registry.pushed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_command_skips_the_rest() {
        let store = MemoryStore::new();
        let registry = FakeRegistry::new();

        let executor = BuildExecutor::new(Box::new(FakeRunner::failing_on("docker build")))
            .with_registry(Box::new(registry.clone()))
            .with_store(Box::new(store.clone()));

        let result = executor
            .execute(&publish_spec(), source_artifact(Path::new(".")), &HashMap::new())
            .await
            .unwrap();

        assert!(!result.success());
        let failure = result.failure.unwrap();
        assert_eq!(failure.index, 1);
        assert!(matches!(
            failure.kind,
            BuildFailureKind::CommandFailed { exit_code: 1 }
        ));
        assert_eq!(failure.stderr, "boom");

        // Halted before login/push/record
        assert_eq!(result.steps.len(), 2);
        assert!(registry.pushed.lock().unwrap().is_empty());
        assert_eq!(store.get("latest-tag").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tag_is_visible_to_shell_commands() {
        let temp = tempfile::TempDir::new().unwrap();
        let spec = BuildSpec {
            commands: vec![
                BuildCommand::Tag {
                    suffix: "arm64".into(),
                },
                BuildCommand::Shell {
                    command: "test -n \"$BUILD_TAG\" && echo \"$BUILD_TAG\" > tag.txt".into(),
                },
            ],
            artifact_files: vec!["tag.txt".to_string()],
            environment: ExecutionEnv::default(),
        };

        let executor = BuildExecutor::new(Box::new(ShellRunner::new()));
        let result = executor
            .execute(&spec, source_artifact(temp.path()), &HashMap::new())
            .await
            .unwrap();

        assert!(result.success());
        let written = std::fs::read_to_string(temp.path().join("tag.txt")).unwrap();
        assert_eq!(written.trim(), result.tag.unwrap().as_str());

        // Declared output collected into the build artifact
        match result.artifact.unwrap() {
            Artifact::BuildOutput { files, .. } => assert_eq!(files.len(), 1),
            other => panic!("unexpected artifact {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_build_input_must_be_source() {
        let (runner, _) = FakeRunner::new();
        let executor = BuildExecutor::new(Box::new(runner));

        let input = Artifact::BuildOutput {
            tag: None,
            files: vec![],
        };
        let err = executor
            .execute(&publish_spec(), input, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ShipflowError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_commands_run_in_the_checkout() {
        let (runner, calls) = FakeRunner::new();
        let executor = BuildExecutor::new(Box::new(runner));

        let spec = BuildSpec {
            commands: vec![BuildCommand::Shell {
                command: "make".into(),
            }],
            artifact_files: vec![],
            environment: ExecutionEnv::default(),
        };

        executor
            .execute(&spec, source_artifact(Path::new("/tmp/checkout/bbb2222")), &HashMap::new())
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, PathBuf::from("/tmp/checkout/bbb2222"));
    }
}
