// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Init command - create a new shipflow project

use colored::Colorize;
use miette::Result;
use std::path::Path;

use crate::utils::print_success;

/// Run the init command
pub async fn run(name: Option<String>, _verbose: bool) -> Result<()> {
    let pipeline_name = name.unwrap_or_else(|| {
        std::env::current_dir()
            .ok()
            .and_then(|p| p.file_name().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_else(|| "my-pipeline".to_string())
    });

    println!("{}", "Initializing shipflow project...".bold());
    println!();

    if Path::new(".shipflow.yaml").exists() {
        return Err(miette::miette!(
            ".shipflow.yaml already exists. Remove it first to re-initialize."
        ));
    }

    let pipeline_content = starter_pipeline(&pipeline_name);

    std::fs::write(".shipflow.yaml", &pipeline_content)
        .map_err(|e| miette::miette!("Failed to write .shipflow.yaml: {}", e))?;
    print_success("Created .shipflow.yaml");

    if !Path::new(".shipflow").exists() {
        std::fs::create_dir_all(".shipflow")
            .map_err(|e| miette::miette!("Failed to create directory '.shipflow': {}", e))?;
        print_success("Created .shipflow/");
    }

    println!();
    println!("{}", "Project initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  1. Edit {} to point at your repository and registry",
        ".shipflow.yaml".cyan()
    );
    println!(
        "  2. Export the registry password as {}",
        "SHIPFLOW_REGISTRY_PASSWORD".cyan()
    );
    println!("  3. Run {} to execute one pass", "shipflow run".cyan());
    println!(
        "  4. Run {} to build on every new commit",
        "shipflow watch".cyan()
    );
    println!();

    Ok(())
}

fn starter_pipeline(name: &str) -> String {
    format!(
        r#"version: "1"
name: "{name}"
description: "Build and publish a container image on every commit"

source:
  repository: "https://example.com/{name}.git"
  branch: "main"

registry:
  url: "registry.example.com"
  username: "ci"
  # password is read from this environment variable
  password_env: "SHIPFLOW_REGISTRY_PASSWORD"

stages:
  - name: "source"
    actions:
      - type: checkout

  - name: "docker-build"
    actions:
      - type: build
        spec:
          commands:
            - type: tag
              suffix: "arm64"
            - type: shell
              command: "docker build -t registry.example.com/{name}:$BUILD_TAG ."
            - type: login
            - type: push
              image: "{name}"
            - type: record
              key: "{name}-latest-tag"
          artifact_files:
            - "imageDetail.json"
          environment:
            privileged: true
            timeout_secs: 900
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;

    #[test]
    fn test_starter_pipeline_parses_and_validates() {
        let yaml = starter_pipeline("craftci");
        let pipeline = Pipeline::from_yaml(&yaml).unwrap();
        assert_eq!(pipeline.name, "craftci");

        let result = crate::pipeline::PipelineValidator::validate(&pipeline);
        assert!(result.is_valid(), "errors: {:?}", result.errors);
    }
}
