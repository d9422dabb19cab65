// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Validate command - check pipeline configuration

use miette::Result;
use std::path::PathBuf;

use crate::pipeline::{Pipeline, PipelineValidator};
use crate::utils::{print_error, print_header, print_success, print_warning};

/// Run the validate command
pub async fn run(pipeline_path: PathBuf, verbose: bool) -> Result<()> {
    if !pipeline_path.exists() {
        return Err(crate::ShipflowError::PipelineNotFound {
            path: pipeline_path,
        }
        .into());
    }

    let pipeline = Pipeline::from_file(&pipeline_path)
        .map_err(|e| miette::miette!("Failed to load pipeline: {}", e))?;

    print_header(&format!("Validating {}", pipeline_path.display()));
    println!();

    let result = PipelineValidator::validate(&pipeline);

    for error in &result.errors {
        print_error(error);
    }
    for warning in &result.warnings {
        print_warning(warning);
    }

    if !result.is_valid() {
        println!();
        return Err(miette::miette!(
            "Pipeline '{}' has {} error(s)",
            pipeline.name,
            result.errors.len()
        ));
    }

    print_success(&format!(
        "Pipeline '{}' is valid ({} stage(s))",
        pipeline.name,
        pipeline.stages.len()
    ));

    if verbose {
        println!();
        for (i, stage) in pipeline.stages.iter().enumerate() {
            let actions: Vec<_> = stage.actions.iter().map(|a| a.label()).collect();
            println!("  {}. {} ({})", i + 1, stage.name, actions.join(", "));
        }
    }

    Ok(())
}
