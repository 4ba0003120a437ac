//! Upload run configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bucket_push_upload_models::{Patterns, Schedule};

/// Computes the remote key suffix for a local file. Returning `None` falls
/// back to the file's path relative to the base directory.
pub type KeyOverride = dyn Fn(&Path) -> Option<String> + Send + Sync;

/// Computes extra transport headers for a local file.
pub type HeaderInjector = dyn Fn(&Path) -> BTreeMap<String, String> + Send + Sync;

/// Default number of files in flight in concurrent mode.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default per-PUT timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Invalid configuration. Lists every problem found, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration: {}", .problems.join("; "))]
pub struct ConfigError {
    /// One entry per problem.
    pub problems: Vec<String>,
}

impl ConfigError {
    /// Returns `Err` when `problems` is non-empty.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] listing `problems`.
    pub fn check(problems: Vec<String>) -> Result<(), Self> {
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Self { problems })
        }
    }
}

/// Everything that controls one upload run.
///
/// Shared read-only by all tasks of a run.
#[derive(Clone)]
pub struct UploadConfig {
    /// Source glob(s). Defaults to everything under the base directory.
    pub from: Option<Patterns>,
    /// Remote destination prefix.
    pub dist: String,
    /// Base directory for key mapping. Overrides the directory supplied by
    /// the invocation.
    pub build_root: Option<PathBuf>,
    /// Per-file key override.
    pub key_override: Option<Arc<KeyOverride>>,
    /// Per-file header injection.
    pub headers: Option<Arc<HeaderInjector>>,
    /// Replace objects that already exist remotely.
    pub overwrite: bool,
    /// Stop scheduling new files after the first failure.
    pub bail: bool,
    /// Sequential or bounded-concurrency scheduling.
    pub schedule: Schedule,
    /// Maximum files in flight in concurrent mode.
    pub concurrency: usize,
    /// Per-PUT timeout.
    pub timeout: Duration,
    /// Delete each local file after it uploads.
    pub delete_origin: bool,
    /// With `delete_origin`, remove parent directories left empty.
    pub delete_empty_dir: bool,
    /// Log every file at `info` instead of `debug`.
    pub verbose: bool,
    /// Compute and log everything without transferring or deleting.
    pub dry_run: bool,
    /// In a build pipeline, fail the run instead of only reporting errors.
    pub quit_on_error: bool,
    /// Where to write the failure list as JSON, if anywhere.
    pub error_log: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            from: None,
            dist: String::new(),
            build_root: None,
            key_override: None,
            headers: None,
            overwrite: false,
            bail: false,
            schedule: Schedule::default(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            delete_origin: false,
            delete_empty_dir: true,
            verbose: false,
            dry_run: false,
            quit_on_error: false,
            error_log: None,
        }
    }
}

impl std::fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadConfig")
            .field("from", &self.from)
            .field("dist", &self.dist)
            .field("build_root", &self.build_root)
            .field("key_override", &self.key_override.is_some())
            .field("headers", &self.headers.is_some())
            .field("overwrite", &self.overwrite)
            .field("bail", &self.bail)
            .field("schedule", &self.schedule)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .field("delete_origin", &self.delete_origin)
            .field("delete_empty_dir", &self.delete_empty_dir)
            .field("verbose", &self.verbose)
            .field("dry_run", &self.dry_run)
            .field("quit_on_error", &self.quit_on_error)
            .field("error_log", &self.error_log)
            .finish()
    }
}

impl UploadConfig {
    /// Checks the configuration before any I/O.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] listing every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.dist.trim().is_empty() {
            problems.push("dist not specified".to_string());
        }
        if self.concurrency == 0 {
            problems.push("concurrency must be at least 1".to_string());
        }
        if self.timeout.is_zero() {
            problems.push("timeout must be greater than zero".to_string());
        }

        if let Some(from) = &self.from {
            let entries = from.entries();
            if entries.is_empty() {
                problems.push("from should be a pattern or a non-empty list".to_string());
            }
            for entry in entries {
                if entry.trim_start_matches('!').trim().is_empty() {
                    problems.push(format!("from contains an empty pattern: {entry:?}"));
                }
            }
        }

        ConfigError::check(problems)
    }

    /// The destination prefix with forward slashes.
    #[must_use]
    pub fn normalized_dist(&self) -> String {
        self.dist.replace('\\', "/")
    }

    /// Extra headers for `path`, including the no-overwrite header when
    /// overwrite is disabled.
    #[must_use]
    pub fn headers_for(&self, path: &Path) -> BTreeMap<String, String> {
        let mut headers = self.headers.as_ref().map(|f| f(path)).unwrap_or_default();
        if !self.overwrite {
            let (name, value) = crate::store::NO_OVERWRITE_HEADER;
            headers.insert(name.to_string(), value.to_string());
        }
        headers
    }

    /// Number of workers the orchestrator starts.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        match self.schedule {
            Schedule::Sequential => 1,
            Schedule::Concurrent => self.concurrency.max(1),
        }
    }
}
