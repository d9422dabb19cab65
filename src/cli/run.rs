// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Run command - execute one pipeline pass

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::executors::{BuildExecutor, ShellRunner};
use crate::pipeline::{
    Action, BuildCommand, Pipeline, PipelineOrchestrator, PipelineOutcome, PipelineReport,
    PipelineValidator,
};
use crate::registry::DockerRegistry;
use crate::source::{GitRepository, SourceWatcher};
use crate::store::FileParameterStore;

/// Run one pipeline pass
pub async fn run(pipeline_path: PathBuf, verbose: bool) -> Result<()> {
    let pipeline = load_and_validate(&pipeline_path, verbose)?;

    let mut orchestrator = assemble(&pipeline)?;

    print_plan(&pipeline);

    let report = orchestrator.run(&pipeline).await?;
    finish(&report, verbose)
}

/// Load a pipeline file and fail on validation errors
pub(crate) fn load_and_validate(pipeline_path: &Path, verbose: bool) -> Result<Pipeline> {
    if !pipeline_path.exists() {
        return Err(crate::ShipflowError::PipelineNotFound {
            path: pipeline_path.to_path_buf(),
        }
        .into());
    }

    let pipeline = Pipeline::from_file(pipeline_path)
        .map_err(|e| miette::miette!("Failed to load pipeline: {}", e))?;

    let validation = PipelineValidator::validate(&pipeline);

    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Pipeline configuration is invalid"));
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    Ok(pipeline)
}

/// Wire the orchestrator from the pipeline configuration
pub(crate) fn assemble(pipeline: &Pipeline) -> Result<PipelineOrchestrator> {
    GitRepository::check_available()?;
    if uses_registry(pipeline) {
        DockerRegistry::check_available()?;
    }

    let workdir = pipeline
        .source
        .workdir
        .clone()
        .unwrap_or_else(|| PathBuf::from(".shipflow/workdir"));
    let repository = GitRepository::new(pipeline.source.repository.clone(), workdir);
    let watcher = SourceWatcher::new(Box::new(repository), pipeline.source.branch.clone());

    let mut builder = BuildExecutor::new(Box::new(ShellRunner::new()));

    if let Some(ref config) = pipeline.registry {
        builder = builder.with_registry(Box::new(DockerRegistry::new(config.clone())));
    }

    let store_path = pipeline
        .store
        .as_ref()
        .and_then(|s| s.path.clone())
        .unwrap_or_else(FileParameterStore::default_path);
    builder = builder.with_store(Box::new(FileParameterStore::new(store_path)));

    Ok(PipelineOrchestrator::new(watcher, builder))
}

/// Whether any build command talks to the registry
fn uses_registry(pipeline: &Pipeline) -> bool {
    pipeline.stages.iter().any(|stage| {
        stage.actions.iter().any(|action| match action {
            Action::Build { spec } => spec
                .commands
                .iter()
                .any(|c| matches!(c, BuildCommand::Login | BuildCommand::Push { .. })),
            Action::Checkout => false,
        })
    })
}

/// Print the execution plan
fn print_plan(pipeline: &Pipeline) {
    println!();
    println!("{}: {}", "Pipeline".bold(), pipeline.name);
    println!("{}", "═".repeat(50));

    for (i, stage) in pipeline.stages.iter().enumerate() {
        let actions: Vec<_> = stage.actions.iter().map(|a| a.label()).collect();
        println!("  {}. {} ({})", i + 1, stage.name.bold(), actions.join(", "));
    }

    println!();
}

/// Print the outcome and map it to the exit status
fn finish(report: &PipelineReport, verbose: bool) -> Result<()> {
    println!();
    match &report.outcome {
        PipelineOutcome::Succeeded => {
            println!(
                "{}",
                format!(
                    "Pipeline completed successfully in {:.2}s",
                    report.duration.as_secs_f64()
                )
                .green()
            );
            if let Some(tag) = report.build.as_ref().and_then(|b| b.tag.as_ref()) {
                println!("Published tag: {}", tag.to_string().cyan());
            }
            Ok(())
        }

        PipelineOutcome::Unchanged => {
            println!("{}", "No new commits; nothing to do.".dimmed());
            Ok(())
        }

        PipelineOutcome::Failed {
            stage,
            action,
            error,
        } => {
            eprintln!(
                "{}",
                format!("Stage '{}' failed at {}: {}", stage, action, error)
                    .red()
                    .bold()
            );
            if verbose {
                if let Some(failure) = report.build.as_ref().and_then(|b| b.failure.as_ref()) {
                    if !failure.stderr.is_empty() {
                        eprintln!("{}", failure.stderr.dimmed());
                    }
                }
            }
            Err(miette::miette!("Pipeline execution failed"))
        }
    }
}
