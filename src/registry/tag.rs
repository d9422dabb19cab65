// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipflow contributors

//! Build tag generation
//!
//! A tag is a fixed-width UTC timestamp followed by a fixed
//! architecture/runtime suffix, e.g. `20240115093000arm64`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed naming scheme for generated tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagScheme {
    /// Suffix appended to the timestamp
    pub suffix: String,
}

impl TagScheme {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

/// Identifier of one published build output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a tag for the given instant
///
/// Pure: the same instant and scheme always produce the same tag. Two
/// invocations within the same wall-clock second collide; uniqueness is
/// only as strong as the caller's cadence, which for this system is one
/// build per pipeline run.
pub fn generate(now: DateTime<Utc>, scheme: &TagScheme) -> Tag {
    Tag(format!("{}{}", now.format("%Y%m%d%H%M%S"), scheme.suffix))
}
