// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Source watcher
//!
//! Detects new commits on the tracked branch. The last-observed commit is
//! owned state with a defined lifecycle: empty at creation, updated only
//! when a change is successfully detected and checked out.

use tracing::{debug, info, warn};

use crate::errors::ShipflowResult;
use crate::pipeline::Artifact;

use super::{CommitId, SourceRepository};

/// Watches one branch of one repository for new commits
pub struct SourceWatcher {
    repository: Box<dyn SourceRepository>,
    branch: String,
    last_seen: Option<CommitId>,
}

impl SourceWatcher {
    pub fn new(repository: Box<dyn SourceRepository>, branch: impl Into<String>) -> Self {
        Self {
            repository,
            branch: branch.into(),
            last_seen: None,
        }
    }

    /// Branch this watcher tracks
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Last commit observed by a successful poll
    pub fn last_seen(&self) -> Option<&CommitId> {
        self.last_seen.as_ref()
    }

    /// Check the branch head against the last observed commit
    ///
    /// Returns a source artifact for the new head, or `None` when nothing
    /// changed. Safe to call repeatedly: with no intervening change the
    /// second call yields no artifact.
    pub async fn poll(&mut self) -> ShipflowResult<Option<Artifact>> {
        let head = self.repository.head_commit(&self.branch).await?;

        if !head.is_well_formed() {
            warn!(head = %head, "head commit id has an unexpected shape");
        }

        if self.last_seen.as_ref() == Some(&head) {
            debug!(branch = %self.branch, head = %head.short(), "no change since last poll");
            return Ok(None);
        }

        let path = self.repository.checkout(&head).await?;
        info!(
            repository = %self.repository.describe(),
            branch = %self.branch,
            head = %head.short(),
            "new head checked out"
        );

        self.last_seen = Some(head.clone());

        Ok(Some(Artifact::Source {
            commit: head,
            branch: self.branch.clone(),
            path,
        }))
    }
}
