#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-file outcome and run result types for bucket uploads.
//!
//! Every file considered by an upload run settles into exactly one
//! [`UploadOutcome`]. The [`RunResult`] collects those outcomes into three
//! ordered lists (uploaded, ignored, failed) and decides whether the run as
//! a whole succeeded.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How the orchestrator drives the upload tasks of a run.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Schedule {
    /// One file at a time, in resolver order.
    Sequential,
    /// Up to `concurrency` files in flight, sliding window.
    #[default]
    Concurrent,
}

/// Source glob pattern(s). List entries starting with `!` subtract their
/// matches from everything accumulated before them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Patterns {
    /// A single glob.
    Single(String),
    /// An ordered list of globs and `!` negations.
    List(Vec<String>),
}

impl Patterns {
    /// The pattern entries in order.
    #[must_use]
    pub fn entries(&self) -> Vec<&str> {
        match self {
            Self::Single(pattern) => vec![pattern.as_str()],
            Self::List(patterns) => patterns.iter().map(String::as_str).collect(),
        }
    }
}

/// One resolved local file, with its remote key computed once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Absolute local path.
    pub path: PathBuf,
    /// Path relative to the base directory, forward-slash separated.
    /// Empty when the file does not live under the base directory.
    pub relative: String,
    /// Remote object key.
    pub key: String,
}

/// A file that was transferred (or would have been, in dry-run mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    /// Absolute local path.
    pub file: PathBuf,
    /// Remote object key.
    pub key: String,
    /// Normalized URL returned by the store. `None` for dry runs.
    pub url: Option<String>,
}

/// A file skipped because its key already exists and overwrite is off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoredFile {
    /// Absolute local path.
    pub file: PathBuf,
    /// Remote object key that already holds an object.
    pub key: String,
}

/// Which step of an upload task failed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// The remote metadata query failed for a reason other than "not found".
    ExistenceCheck,
    /// The PUT failed (network, auth, quota, precondition, timeout).
    Transfer,
}

/// Provider error details captured for a failed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    /// Provider error code (e.g. `AccessDenied`, `Timeout`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Error class name (e.g. `ServiceError`, `TimeoutError`).
    pub name: String,
    /// Which step failed. Not part of the persisted error log.
    #[serde(skip)]
    pub kind: FailureKind,
}

/// A failed file. Serializes as `{file, err: {code, message, name}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Absolute local path.
    pub file: PathBuf,
    /// Remote object key the file maps to.
    #[serde(skip)]
    pub key: String,
    /// Error details.
    pub err: FailureDetail,
}

/// The settled state of one upload task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Transferred, or simulated in dry-run mode.
    Uploaded(UploadedFile),
    /// Already present remotely and overwrite is disabled.
    Ignored(IgnoredFile),
    /// Existence check or transfer failed.
    Failed(FailureRecord),
}

impl UploadOutcome {
    /// Whether this outcome is a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Aggregate of all outcomes recorded during one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Files transferred, in completion order.
    pub uploaded: Vec<UploadedFile>,
    /// Files skipped because they already exist remotely.
    pub ignored: Vec<IgnoredFile>,
    /// Files that failed.
    pub failures: Vec<FailureRecord>,
}

impl RunResult {
    /// Appends an outcome to the matching list.
    pub fn record(&mut self, outcome: UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded(file) => self.uploaded.push(file),
            UploadOutcome::Ignored(file) => self.ignored.push(file),
            UploadOutcome::Failed(record) => self.failures.push(record),
        }
    }

    /// `true` when no file failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of files that settled.
    #[must_use]
    pub fn total(&self) -> usize {
        self.uploaded.len() + self.ignored.len() + self.failures.len()
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} uploaded, {} ignored (exists), {} failed",
            self.uploaded.len(),
            self.ignored.len(),
            self.failures.len()
        )
    }
}
