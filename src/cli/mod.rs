// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for shipflow.

pub mod init;
pub mod run;
pub mod validate;
pub mod watch;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Continuous-delivery pipeline orchestrator
///
/// Watch a branch, build a container image, publish it, record the tag.
#[derive(Parser, Debug)]
#[clap(
    name = "shipflow",
    version,
    about = "Continuous-delivery pipeline orchestrator for container image builds",
    long_about = None,
    after_help = "Examples:\n\
        shipflow init                   Initialize a new project\n\
        shipflow validate               Check the pipeline configuration\n\
        shipflow run                    Execute one pipeline pass\n\
        shipflow watch                  Poll the source and run on change\n\n\
        See 'shipflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new shipflow project
    Init {
        /// Pipeline name (defaults to current directory name)
        name: Option<String>,
    },

    /// Validate pipeline configuration
    Validate {
        /// Pipeline file to validate
        #[clap(default_value = ".shipflow.yaml")]
        pipeline: PathBuf,
    },

    /// Execute one pipeline pass
    Run {
        /// Pipeline file
        #[clap(short, long, default_value = ".shipflow.yaml")]
        pipeline: PathBuf,
    },

    /// Watch mode - poll the source branch and run on change
    Watch {
        /// Pipeline file
        #[clap(short, long, default_value = ".shipflow.yaml")]
        pipeline: PathBuf,

        /// Poll interval in seconds
        #[clap(long, default_value = "30")]
        interval: u64,
    },
}
