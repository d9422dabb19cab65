// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Pipeline orchestrator
//!
//! Advances through stages in declared order, routing the artifact each
//! completed stage produces into the next. The first failing action
//! aborts its stage and the pipeline; later stages stay pending. At most
//! one stage is running at any time.

use colored::Colorize;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::errors::{ShipflowError, ShipflowResult};
use crate::executors::{BuildExecutor, BuildResult};
use crate::pipeline::{Action, Artifact, Pipeline, PipelineValidator, StageStatus};
use crate::source::SourceWatcher;

/// Pipeline orchestrator
pub struct PipelineOrchestrator {
    watcher: SourceWatcher,
    builder: BuildExecutor,
}

impl PipelineOrchestrator {
    pub fn new(watcher: SourceWatcher, builder: BuildExecutor) -> Self {
        Self { watcher, builder }
    }

    /// Execute one pipeline pass
    ///
    /// Configuration errors are reported before any stage runs. A source
    /// poll that finds no new commit ends the pass with
    /// [`PipelineOutcome::Unchanged`] and leaves later stages pending.
    pub async fn run(&mut self, pipeline: &Pipeline) -> ShipflowResult<PipelineReport> {
        let validation = PipelineValidator::validate(pipeline);
        if !validation.is_valid() {
            return Err(ShipflowError::InvalidPipeline {
                reason: validation.errors.join("; "),
                help: Some("Run 'shipflow validate' for details".to_string()),
            });
        }

        let start = Instant::now();
        let mut report = PipelineReport::new(pipeline);
        let mut artifact: Option<Artifact> = None;

        info!(pipeline = %pipeline.name, "pipeline run starting");

        for (stage_idx, stage) in pipeline.stages.iter().enumerate() {
            report.stages[stage_idx].status = StageStatus::Running;
            let stage_start = Instant::now();

            for action in &stage.actions {
                match action {
                    Action::Checkout => match self.watcher.poll().await {
                        Ok(Some(source)) => {
                            info!(artifact = %source, "source change detected");
                            artifact = Some(source);
                        }
                        Ok(None) => {
                            report.stages[stage_idx].status = StageStatus::Succeeded;
                            report.outcome = PipelineOutcome::Unchanged;
                            report.duration = start.elapsed();
                            println!(
                                "  {} {} {}",
                                "○".dimmed(),
                                stage.name,
                                "(no change)".dimmed()
                            );
                            return Ok(report);
                        }
                        Err(e) => {
                            return Ok(report.fail(
                                stage_idx,
                                &stage.name,
                                action.label(),
                                e.to_string(),
                                start.elapsed(),
                            ));
                        }
                    },

                    Action::Build { spec } => {
                        let input = match artifact.take() {
                            Some(input) => input,
                            None => {
                                // Validation catches this before execution
                                return Err(ShipflowError::MissingArtifactInput {
                                    stage: stage.name.clone(),
                                });
                            }
                        };

                        match self.builder.execute(spec, input, &pipeline.env).await {
                            Ok(result) if result.success() => {
                                artifact = result.artifact.clone();
                                report.build = Some(result);
                            }
                            Ok(result) => {
                                let message = result
                                    .failure
                                    .as_ref()
                                    .map(|f| f.to_string())
                                    .unwrap_or_else(|| "build failed".to_string());
                                let mut report = report.fail(
                                    stage_idx,
                                    &stage.name,
                                    action.label(),
                                    message,
                                    start.elapsed(),
                                );
                                report.build = Some(result);
                                return Ok(report);
                            }
                            Err(e) => {
                                return Ok(report.fail(
                                    stage_idx,
                                    &stage.name,
                                    action.label(),
                                    e.to_string(),
                                    start.elapsed(),
                                ));
                            }
                        }
                    }
                }
            }

            report.stages[stage_idx].status = StageStatus::Succeeded;
            println!(
                "  {} {} ({:.2}s)",
                "✓".green(),
                stage.name.bold(),
                stage_start.elapsed().as_secs_f64()
            );
        }

        report.outcome = PipelineOutcome::Succeeded;
        report.duration = start.elapsed();
        info!(
            pipeline = %pipeline.name,
            duration_s = report.duration.as_secs_f64(),
            "pipeline run succeeded"
        );

        Ok(report)
    }
}

/// Result of one pipeline pass
#[derive(Debug)]
pub struct PipelineReport {
    /// Pipeline name
    pub pipeline: String,

    /// Final status of every stage, in declared order
    pub stages: Vec<StageReport>,

    /// Overall outcome
    pub outcome: PipelineOutcome,

    /// Result of the build stage, when one ran
    pub build: Option<BuildResult>,

    /// Total wall-clock duration
    pub duration: Duration,
}

/// Final status of one stage
#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub status: StageStatus,
}

/// Overall outcome of a pipeline pass
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Every stage succeeded
    Succeeded,

    /// The tracked branch head did not move; nothing ran past the source
    Unchanged,

    /// A stage failed; later stages never ran
    Failed {
        stage: String,
        action: String,
        error: String,
    },
}

impl PipelineReport {
    fn new(pipeline: &Pipeline) -> Self {
        Self {
            pipeline: pipeline.name.clone(),
            stages: pipeline
                .stages
                .iter()
                .map(|s| StageReport {
                    name: s.name.clone(),
                    status: StageStatus::Pending,
                })
                .collect(),
            outcome: PipelineOutcome::Unchanged,
            build: None,
            duration: Duration::ZERO,
        }
    }

    fn fail(
        mut self,
        stage_idx: usize,
        stage: &str,
        action: &str,
        error: String,
        duration: Duration,
    ) -> Self {
        self.stages[stage_idx].status = StageStatus::Failed;
        self.duration = duration;
        println!("  {} {} failed", "✗".red(), stage.bold());
        error!(stage, action, %error, "stage failed, pipeline aborted");
        self.outcome = PipelineOutcome::Failed {
            stage: stage.to_string(),
            action: action.to_string(),
            error,
        };
        self
    }

    /// Whether the pass ended without a failure
    pub fn success(&self) -> bool {
        !matches!(self.outcome, PipelineOutcome::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    use crate::executors::ShellRunner;
    use crate::pipeline::{BuildCommand, BuildSpec, ExecutionEnv, SourceConfig, Stage};
    use crate::source::{CommitId, SourceRepository};

    #[derive(Clone)]
    struct FakeRepository {
        head: Arc<Mutex<String>>,
        base: PathBuf,
    }

    impl FakeRepository {
        fn new(head: &str, base: &std::path::Path) -> Self {
            Self {
                head: Arc::new(Mutex::new(head.to_string())),
                base: base.to_path_buf(),
            }
        }

        fn set_head(&self, head: &str) {
            *self.head.lock().unwrap() = head.to_string();
        }
    }

    #[async_trait]
    impl SourceRepository for FakeRepository {
        async fn head_commit(&self, _branch: &str) -> ShipflowResult<CommitId> {
            Ok(CommitId::new(self.head.lock().unwrap().clone()))
        }

        async fn checkout(&self, commit: &CommitId) -> ShipflowResult<PathBuf> {
            let dir = self.base.join(commit.as_str());
            std::fs::create_dir_all(&dir)?;
            Ok(dir)
        }

        fn describe(&self) -> String {
            "fake".to_string()
        }
    }

    fn shell_stage(name: &str, command: &str) -> Stage {
        Stage {
            name: name.into(),
            description: None,
            actions: vec![Action::Build {
                spec: BuildSpec {
                    commands: vec![BuildCommand::Shell {
                        command: command.into(),
                    }],
                    artifact_files: vec![],
                    environment: ExecutionEnv::default(),
                },
            }],
        }
    }

    fn pipeline(stages: Vec<Stage>) -> Pipeline {
        Pipeline {
            version: "1".into(),
            name: "test".into(),
            description: None,
            source: SourceConfig {
                repository: "fake".into(),
                branch: "main".into(),
                workdir: None,
            },
            registry: None,
            store: None,
            env: HashMap::new(),
            stages,
        }
    }

    fn source_stage() -> Stage {
        Stage {
            name: "source".into(),
            description: None,
            actions: vec![Action::Checkout],
        }
    }

    fn orchestrator(repo: FakeRepository) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            SourceWatcher::new(Box::new(repo), "main"),
            BuildExecutor::new(Box::new(ShellRunner::new())),
        )
    }

    #[tokio::test]
    async fn test_stages_succeed_in_order() {
        let temp = TempDir::new().unwrap();
        let repo = FakeRepository::new("aaa1111", temp.path());
        let mut orch = orchestrator(repo);

        let p = pipeline(vec![source_stage(), shell_stage("build", "true")]);
        let report = orch.run(&p).await.unwrap();

        assert!(matches!(report.outcome, PipelineOutcome::Succeeded));
        assert!(report
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_unchanged_head_does_not_start_a_run() {
        let temp = TempDir::new().unwrap();
        let repo = FakeRepository::new("aaa1111", temp.path());
        let mut orch = orchestrator(repo);

        let marker = temp.path().join("aaa1111/ran.txt");
        let p = pipeline(vec![
            source_stage(),
            shell_stage("build", "echo once >> ran.txt"),
        ]);

        let first = orch.run(&p).await.unwrap();
        assert!(matches!(first.outcome, PipelineOutcome::Succeeded));
        assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 1);

        let second = orch.run(&p).await.unwrap();
        assert!(matches!(second.outcome, PipelineOutcome::Unchanged));
        assert_eq!(second.stages[1].status, StageStatus::Pending);
        assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_head_move_triggers_build_with_new_commit() {
        let temp = TempDir::new().unwrap();
        let repo = FakeRepository::new("aaa1111", temp.path());
        let handle = repo.clone();
        let mut orch = orchestrator(repo);

        let p = pipeline(vec![
            source_stage(),
            shell_stage("build", "basename \"$PWD\" > commit.txt"),
        ]);

        orch.run(&p).await.unwrap();
        handle.set_head("bbb2222");
        let report = orch.run(&p).await.unwrap();

        assert!(matches!(report.outcome, PipelineOutcome::Succeeded));
        let written =
            std::fs::read_to_string(temp.path().join("bbb2222/commit.txt")).unwrap();
        assert_eq!(written.trim(), "bbb2222");
    }

    #[tokio::test]
    async fn test_failed_stage_leaves_later_stages_pending() {
        let temp = TempDir::new().unwrap();
        let repo = FakeRepository::new("aaa1111", temp.path());
        let mut orch = orchestrator(repo);

        let p = pipeline(vec![
            source_stage(),
            shell_stage("build", "exit 1"),
            shell_stage("package", "true"),
        ]);

        let report = orch.run(&p).await.unwrap();

        assert!(!report.success());
        assert!(matches!(
            &report.outcome,
            PipelineOutcome::Failed { stage, .. } if stage == "build"
        ));

        // Succeeded stages form a prefix of the declared order
        let statuses: Vec<_> = report.stages.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StageStatus::Succeeded,
                StageStatus::Failed,
                StageStatus::Pending
            ]
        );
    }

    #[tokio::test]
    async fn test_build_without_checkout_is_a_configuration_error() {
        let temp = TempDir::new().unwrap();
        let repo = FakeRepository::new("aaa1111", temp.path());
        let mut orch = orchestrator(repo);

        let p = pipeline(vec![shell_stage("build", "true")]);
        let err = orch.run(&p).await.unwrap_err();

        assert!(matches!(err, ShipflowError::InvalidPipeline { .. }));
    }

    #[tokio::test]
    async fn test_successful_build_reports_an_output_artifact() {
        let temp = TempDir::new().unwrap();
        let repo = FakeRepository::new("ccc3333", temp.path());
        let mut orch = orchestrator(repo);

        let p = pipeline(vec![source_stage(), shell_stage("build", "true")]);
        let report = orch.run(&p).await.unwrap();

        let build = report.build.expect("build result");
        assert!(build.success());
        assert!(matches!(
            build.artifact,
            Some(Artifact::BuildOutput { .. })
        ));
    }
}
