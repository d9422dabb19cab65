// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Registry publishing
//!
//! Authenticates to an image registry and pushes tagged images. Retry is
//! the caller's concern; every failure is classified and surfaced once.

mod tag;

pub use tag::{generate, Tag, TagScheme};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::pipeline::RegistryConfig;

/// Publish failure classification
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("authentication to {registry} failed: {detail}")]
    AuthenticationFailed { registry: String, detail: String },

    #[error("push of {image} rejected: {detail}")]
    PushRejected { image: String, detail: String },

    #[error("transport failure: {detail}")]
    Transport { detail: String },
}

/// Proof of a completed credential exchange
///
/// Pushing requires a session, which makes the login-before-push ordering
/// a compile-time property for direct callers.
#[derive(Debug, Clone)]
pub struct Session {
    registry: String,
    authenticated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            authenticated_at: Utc::now(),
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }
}

/// Narrow interface to the image registry
#[async_trait]
pub trait Registry: Send + Sync {
    /// Exchange credentials for a session
    async fn login(&self) -> Result<Session, PublishError>;

    /// Push `image` labeled with `tag`
    async fn push(&self, session: &Session, image: &str, tag: &Tag) -> Result<(), PublishError>;
}

/// Docker CLI implementation of [`Registry`]
pub struct DockerRegistry {
    config: RegistryConfig,
}

impl DockerRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    /// Check that the docker CLI is installed
    pub fn check_available() -> crate::ShipflowResult<()> {
        which::which("docker").map_err(|_| crate::ShipflowError::tool_not_found("docker"))?;
        Ok(())
    }

    fn image_ref(&self, image: &str, tag: &Tag) -> String {
        format!("{}/{}:{}", self.config.url, image, tag)
    }
}

#[async_trait]
impl Registry for DockerRegistry {
    async fn login(&self) -> Result<Session, PublishError> {
        let password = std::env::var(&self.config.password_env).map_err(|_| {
            PublishError::AuthenticationFailed {
                registry: self.config.url.clone(),
                detail: format!(
                    "credential environment variable '{}' is not set",
                    self.config.password_env
                ),
            }
        })?;

        let mut child = Command::new("docker")
            .args([
                "login",
                "--username",
                &self.config.username,
                "--password-stdin",
                &self.config.url,
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PublishError::Transport {
                detail: format!("failed to run docker login: {}", e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(password.as_bytes())
                .await
                .map_err(|e| PublishError::Transport {
                    detail: format!("failed to pass credentials: {}", e),
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PublishError::Transport {
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(PublishError::AuthenticationFailed {
                registry: self.config.url.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(registry = %self.config.url, "registry login succeeded");

        Ok(Session::new(self.config.url.clone()))
    }

    async fn push(&self, session: &Session, image: &str, tag: &Tag) -> Result<(), PublishError> {
        let image_ref = self.image_ref(image, tag);
        debug!(registry = %session.registry(), %image_ref, "pushing image");

        let output = Command::new("docker")
            .args(["push", &image_ref])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PublishError::Transport {
                detail: format!("failed to run docker push: {}", e),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_push_failure(
            &self.config.url,
            image,
            stderr,
        ))
    }
}

/// Classify a failed push from the CLI's stderr
///
/// Auth expiry shows up as denial, network trouble as transport; anything
/// else (quota, permissions, tag conflicts) is a rejection by the
/// registry.
fn classify_push_failure(registry: &str, image: &str, stderr: String) -> PublishError {
    let lowered = stderr.to_lowercase();

    if lowered.contains("unauthorized")
        || lowered.contains("authentication required")
        || lowered.contains("denied")
    {
        PublishError::AuthenticationFailed {
            registry: registry.to_string(),
            detail: stderr,
        }
    } else if lowered.contains("timeout")
        || lowered.contains("connection refused")
        || lowered.contains("no such host")
        || lowered.contains("network is unreachable")
        || lowered.contains("tls handshake")
    {
        PublishError::Transport { detail: stderr }
    } else {
        PublishError::PushRejected {
            image: image.to_string(),
            detail: stderr,
        }
    }
}
