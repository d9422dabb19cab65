// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Pipeline validation
//!
//! Validates pipeline configuration before execution. Anything reported
//! here is a configuration error, never a runtime failure: a pipeline
//! that fails validation does not start.

use std::collections::HashSet;

use crate::pipeline::{Action, BuildCommand, BuildSpec, Pipeline, Stage};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline configuration
    pub fn validate(pipeline: &Pipeline) -> ValidationResult {
        let mut result = ValidationResult::new();

        if pipeline.stages.is_empty() {
            result.add_error("Pipeline has no stages defined");
        }

        let mut seen_names = HashSet::new();
        for stage in &pipeline.stages {
            if !seen_names.insert(&stage.name) {
                result.add_error(&format!("Duplicate stage name: '{}'", stage.name));
            }
        }

        // Artifact wiring: a build consumes the artifact of an earlier
        // checkout, so a build with no upstream checkout can never run.
        let mut artifact_available = false;
        for stage in &pipeline.stages {
            for action in &stage.actions {
                match action {
                    Action::Checkout => artifact_available = true,
                    Action::Build { .. } => {
                        if !artifact_available {
                            result.add_error(&format!(
                                "Stage '{}' consumes an artifact that no earlier stage produces",
                                stage.name
                            ));
                        }
                    }
                }
            }
        }

        for stage in &pipeline.stages {
            Self::validate_stage(stage, pipeline, &mut result);
        }

        result
    }

    /// Validate a single stage
    fn validate_stage(stage: &Stage, pipeline: &Pipeline, result: &mut ValidationResult) {
        if stage.actions.is_empty() {
            result.add_error(&format!("Stage '{}' has no actions", stage.name));
        }

        for action in &stage.actions {
            if let Action::Build { spec } = action {
                Self::validate_build_spec(stage, spec, pipeline, result);
            }
        }
    }

    /// Validate one build spec's command sequence
    fn validate_build_spec(
        stage: &Stage,
        spec: &BuildSpec,
        pipeline: &Pipeline,
        result: &mut ValidationResult,
    ) {
        if spec.commands.is_empty() {
            result.add_error(&format!("Stage '{}': build has no commands", stage.name));
            return;
        }

        let mut tag_seen = false;
        let mut login_seen = false;
        let mut push_seen = false;

        for (index, command) in spec.commands.iter().enumerate() {
            match command {
                BuildCommand::Tag { suffix } => {
                    if tag_seen {
                        result.add_error(&format!(
                            "Stage '{}': command {} regenerates the build tag; a tag is generated once per invocation",
                            stage.name, index
                        ));
                    }
                    if suffix.is_empty() {
                        result.add_warning(&format!(
                            "Stage '{}': tag command has an empty suffix",
                            stage.name
                        ));
                    }
                    tag_seen = true;
                }
                BuildCommand::Shell { command } => {
                    if command.is_empty() {
                        result.add_error(&format!(
                            "Stage '{}': command {} is an empty shell command",
                            stage.name, index
                        ));
                    }
                }
                BuildCommand::Login => {
                    if pipeline.registry.is_none() {
                        result.add_error(&format!(
                            "Stage '{}': login command but the pipeline has no registry section",
                            stage.name
                        ));
                    }
                    login_seen = true;
                }
                BuildCommand::Push { .. } => {
                    if pipeline.registry.is_none() {
                        result.add_error(&format!(
                            "Stage '{}': push command but the pipeline has no registry section",
                            stage.name
                        ));
                    }
                    if !login_seen {
                        result.add_error(&format!(
                            "Stage '{}': command {} pushes before any login",
                            stage.name, index
                        ));
                    }
                    if !tag_seen {
                        result.add_error(&format!(
                            "Stage '{}': command {} pushes before the build tag is generated",
                            stage.name, index
                        ));
                    }
                    push_seen = true;
                }
                BuildCommand::Record { .. } => {
                    if !tag_seen {
                        result.add_error(&format!(
                            "Stage '{}': command {} records before the build tag is generated",
                            stage.name, index
                        ));
                    }
                    // A failed publish must never advance the recorded tag,
                    // so the record has to follow a push.
                    if !push_seen {
                        result.add_error(&format!(
                            "Stage '{}': command {} records the tag before any push",
                            stage.name, index
                        ));
                    }
                }
            }
        }

        if spec.artifact_files.is_empty() {
            result.add_warning(&format!(
                "Stage '{}': build collects no artifact files",
                stage.name
            ));
        }
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ExecutionEnv, RegistryConfig, SourceConfig};
    use std::collections::HashMap;

    fn source_config() -> SourceConfig {
        SourceConfig {
            repository: "./repo".into(),
            branch: "main".into(),
            workdir: None,
        }
    }

    fn registry_config() -> RegistryConfig {
        RegistryConfig {
            url: "registry.example.com".into(),
            username: "ci".into(),
            password_env: "SHIPFLOW_REGISTRY_PASSWORD".into(),
        }
    }

    fn pipeline_with(registry: Option<RegistryConfig>, stages: Vec<Stage>) -> Pipeline {
        Pipeline {
            version: "1".into(),
            name: "test".into(),
            description: None,
            source: source_config(),
            registry,
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

    fn build_stage(commands: Vec<BuildCommand>) -> Stage {
        Stage {
            name: "build".into(),
            description: None,
            actions: vec![Action::Build {
                spec: BuildSpec {
                    commands,
                    artifact_files: vec!["out.json".into()],
                    environment: ExecutionEnv::default(),
                },
            }],
        }
    }

    fn publish_commands() -> Vec<BuildCommand> {
        vec![
            BuildCommand::Tag {
                suffix: "arm64".into(),
            },
            BuildCommand::Shell {
                command: "docker build .".into(),
            },
            BuildCommand::Login,
            BuildCommand::Push {
                image: "craftci".into(),
            },
            BuildCommand::Record {
                key: "latest-tag".into(),
            },
        ]
    }

    #[test]
    fn test_valid_pipeline_passes() {
        let pipeline = pipeline_with(
            Some(registry_config()),
            vec![source_stage(), build_stage(publish_commands())],
        );

        let result = PipelineValidator::validate(&pipeline);
        assert!(result.is_valid(), "errors: {:?}", result.errors);
    }

    #[test]
    fn test_empty_pipeline_is_invalid() {
        let pipeline = pipeline_with(None, vec![]);
        let result = PipelineValidator::validate(&pipeline);

        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no stages"));
    }

    #[test]
    fn test_duplicate_stage_names() {
        let pipeline = pipeline_with(None, vec![source_stage(), source_stage()]);
        let result = PipelineValidator::validate(&pipeline);

        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Duplicate")));
    }

    #[test]
    fn test_build_without_checkout_is_invalid() {
        let pipeline = pipeline_with(
            Some(registry_config()),
            vec![build_stage(publish_commands())],
        );
        let result = PipelineValidator::validate(&pipeline);

        assert!(!result.is_valid());
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("no earlier stage produces")));
    }

    #[test]
    fn test_empty_command_list_is_invalid() {
        let pipeline = pipeline_with(None, vec![source_stage(), build_stage(vec![])]);
        let result = PipelineValidator::validate(&pipeline);

        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("no commands")));
    }

    #[test]
    fn test_duplicate_tag_command_is_invalid() {
        let mut commands = publish_commands();
        commands.push(BuildCommand::Tag {
            suffix: "arm64".into(),
        });
        let pipeline = pipeline_with(Some(registry_config()), vec![source_stage(), build_stage(commands)]);
        let result = PipelineValidator::validate(&pipeline);

        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("regenerates")));
    }

    #[test]
    fn test_push_before_login_is_invalid() {
        let commands = vec![
            BuildCommand::Tag {
                suffix: "arm64".into(),
            },
            BuildCommand::Push {
                image: "craftci".into(),
            },
        ];
        let pipeline = pipeline_with(Some(registry_config()), vec![source_stage(), build_stage(commands)]);
        let result = PipelineValidator::validate(&pipeline);

        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("before any login")));
    }

    #[test]
    fn test_record_before_push_is_invalid() {
        let commands = vec![
            BuildCommand::Tag {
                suffix: "arm64".into(),
            },
            BuildCommand::Login,
            BuildCommand::Record {
                key: "latest-tag".into(),
            },
            BuildCommand::Push {
                image: "craftci".into(),
            },
        ];
        let pipeline = pipeline_with(Some(registry_config()), vec![source_stage(), build_stage(commands)]);
        let result = PipelineValidator::validate(&pipeline);

        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("before any push")));
    }

    #[test]
    fn test_push_without_registry_section() {
        let pipeline = pipeline_with(None, vec![source_stage(), build_stage(publish_commands())]);
        let result = PipelineValidator::validate(&pipeline);

        assert!(!result.is_valid());
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("no registry section")));
    }

    #[test]
    fn test_no_artifact_files_is_a_warning() {
        let stage = Stage {
            name: "build".into(),
            description: None,
            actions: vec![Action::Build {
                spec: BuildSpec {
                    commands: vec![BuildCommand::Shell {
                        command: "make".into(),
                    }],
                    artifact_files: vec![],
                    environment: ExecutionEnv::default(),
                },
            }],
        };
        let pipeline = pipeline_with(None, vec![source_stage(), stage]);
        let result = PipelineValidator::validate(&pipeline);

        assert!(result.is_valid());
        assert!(result.has_warnings());
    }
}
