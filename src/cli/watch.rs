// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Watch command - poll the source branch and run the pipeline on change
//!
//! One orchestrator lives for the whole watch session, so the watcher's
//! last-observed commit carries across polls and unchanged heads skip the
//! run. Runs never interleave: each pass completes before the next poll.

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::pipeline::PipelineOutcome;
use crate::utils::create_spinner;

use super::run::{assemble, load_and_validate};

/// Run the watch command
pub async fn run(pipeline_path: PathBuf, interval_secs: u64, verbose: bool) -> Result<()> {
    let pipeline = load_and_validate(&pipeline_path, verbose)?;
    let mut orchestrator = assemble(&pipeline)?;

    let interval_secs = interval_secs.max(1);

    println!("{}", "Starting watch mode...".bold());
    println!(
        "Polling {} ({}) every {}s",
        pipeline.source.repository,
        pipeline.source.branch,
        interval_secs
    );
    println!("Press {} to exit.", "Ctrl+C".cyan());
    println!();

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let spinner = create_spinner(&format!(
            "watching {} for changes",
            pipeline.source.branch
        ));
        ticker.tick().await;
        spinner.finish_and_clear();

        match orchestrator.run(&pipeline).await {
            Ok(report) => match &report.outcome {
                PipelineOutcome::Succeeded => {
                    println!(
                        "{} ({:.2}s)",
                        "Pipeline completed successfully".green(),
                        report.duration.as_secs_f64()
                    );
                    if let Some(tag) = report.build.as_ref().and_then(|b| b.tag.as_ref()) {
                        println!("Published tag: {}", tag.to_string().cyan());
                    }
                    println!();
                }
                PipelineOutcome::Unchanged => {
                    if verbose {
                        println!("{}", "No change detected.".dimmed());
                    }
                }
                PipelineOutcome::Failed { stage, error, .. } => {
                    eprintln!(
                        "{}",
                        format!("Stage '{}' failed: {}", stage, error).red()
                    );
                    println!();
                }
            },
            Err(e) => {
                eprintln!("{}: {}", "Pipeline error".red(), e);
                println!();
            }
        }
    }
}
