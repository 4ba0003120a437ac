#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Upload orchestration for build artifacts.
//!
//! [`Uploader::run`] resolves the configured globs into local files, maps
//! each file to a remote key, and uploads the files through an
//! [`ObjectStore`] with bounded concurrency (or one at a time).
//!
//! ## Skipping existing objects
//!
//! Unless `overwrite` is set, every key is looked up before it is written
//! and files whose key already exists are ignored. The PUT also carries
//! `If-None-Match: *`, so a key created between the lookup and the write is
//! rejected by the store instead of silently replaced.
//!
//! ## Failure handling
//!
//! Per-file failures are collected into the [`RunResult`]. With `bail`, the
//! first failure stops new files from starting. How a failed run settles
//! depends on the [`Invocation`]: standalone runs return an error carrying
//! the partial result, pipeline runs report to the build's [`ErrorSink`].

pub mod cleanup;
pub mod config;
pub mod error_log;
pub mod hook;
pub mod keys;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod orchestrator;
pub mod progress;
pub mod resolver;
pub mod store;
pub mod task;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use bucket_push_upload_models::{
    FailureDetail, FailureKind, FailureRecord, FileDescriptor, IgnoredFile, Patterns, RunResult,
    Schedule, UploadOutcome, UploadedFile,
};
pub use config::{ConfigError, HeaderInjector, KeyOverride, UploadConfig};
pub use hook::{ErrorSink, Invocation};
pub use progress::{NullProgress, ProgressCallback, null_progress};
pub use resolver::ResolveError;
pub use store::{ObjectHead, ObjectStore, PutOptions, PutResponse, StoreError, StoreErrorKind};

/// Errors that settle an upload run.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The configuration is invalid; nothing was uploaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The source patterns could not be resolved; nothing was uploaded.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The run completed with failures.
    #[error("{} file(s) failed to upload ({})", result.failures.len(), result)]
    Failed {
        /// Everything recorded during the run.
        result: Box<RunResult>,
    },

    /// The run stopped after its first failure.
    #[error("Upload aborted after {} failed ({})", file.display(), result)]
    Bailed {
        /// The file whose failure stopped the run.
        file: PathBuf,
        /// Everything recorded before the run stopped.
        result: Box<RunResult>,
    },

    /// One file failed. Used when reporting to an [`ErrorSink`].
    #[error(
        "Failed to upload {} to {}: {}-{}: {}",
        .0.file.display(),
        .0.key,
        .0.err.name,
        .0.err.code,
        .0.err.message
    )]
    File(Box<FailureRecord>),
}

impl UploadError {
    /// The run result attached to this error, if the run got that far.
    #[must_use]
    pub fn run_result(&self) -> Option<&RunResult> {
        match self {
            Self::Failed { result } | Self::Bailed { result, .. } => Some(result),
            Self::Config(_) | Self::Resolve(_) | Self::File(_) => None,
        }
    }

    /// Consumes the error, returning the attached run result.
    #[must_use]
    pub fn into_run_result(self) -> Option<RunResult> {
        match self {
            Self::Failed { result } | Self::Bailed { result, .. } => Some(*result),
            Self::Config(_) | Self::Resolve(_) | Self::File(_) => None,
        }
    }
}

/// Uploads build artifacts to an [`ObjectStore`].
pub struct Uploader {
    config: Arc<UploadConfig>,
    store: Arc<dyn ObjectStore>,
    progress: Arc<dyn ProgressCallback>,
}

impl Uploader {
    /// Creates an uploader with no progress reporting.
    #[must_use]
    pub fn new(config: UploadConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            progress: null_progress(),
        }
    }

    /// Reports per-file progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Resolves the files of a run and computes their remote keys, without
    /// contacting the store.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Config`] for an invalid configuration and
    /// [`UploadError::Resolve`] if the patterns cannot be expanded.
    pub fn plan(&self, directory: &Path) -> Result<Vec<FileDescriptor>, UploadError> {
        self.config.validate()?;

        let base_dir = self.base_dir(directory)?;
        let default_pattern;
        let patterns: Vec<&str> = if let Some(from) = &self.config.from {
            from.entries()
        } else {
            default_pattern = format!("{}/**", globset::escape(&keys::to_slash(&base_dir)));
            vec![default_pattern.as_str()]
        };

        let cwd = std::env::current_dir().map_err(config_io_error)?;
        let files = resolver::resolve(&patterns, &cwd)?;
        let dist = self.config.normalized_dist();

        Ok(files
            .into_iter()
            .map(|path| FileDescriptor {
                relative: keys::relative_to_base(&path, &base_dir),
                key: keys::map_to_remote_key(
                    &path,
                    &base_dir,
                    &dist,
                    self.config.key_override.as_deref(),
                ),
                path,
            })
            .collect())
    }

    /// Runs one upload over the files selected by the configuration.
    ///
    /// Every call starts from an empty [`RunResult`]; nothing carries over
    /// between runs.
    ///
    /// # Errors
    ///
    /// See [`Invocation::settle`]. Standalone runs return
    /// [`UploadError::Config`] / [`UploadError::Resolve`] before any upload,
    /// [`UploadError::Bailed`] when fail-fast stopped the run, and
    /// [`UploadError::Failed`] when any file failed.
    pub async fn run(&self, invocation: Invocation<'_>) -> Result<RunResult, UploadError> {
        let outcome = self.execute(invocation.directory()).await;
        invocation.settle(outcome, self.config.quit_on_error)
    }

    async fn execute(&self, directory: &Path) -> Result<RunResult, UploadError> {
        let files = self.plan(directory)?;
        if files.is_empty() {
            log::warn!("No files matched, nothing to upload");
            return Ok(RunResult::default());
        }

        let run = orchestrator::run(
            files,
            &self.config,
            self.store.as_ref(),
            self.progress.as_ref(),
        )
        .await;
        let result = run.result;

        self.progress.finish(result.to_string());
        log::info!("Upload complete: {result}");

        if !result.failures.is_empty()
            && let Some(path) = &self.config.error_log
            && let Err(e) = error_log::write(path, &result.failures).await
        {
            log::error!("{e}");
        }

        if run.bailed {
            let file = result
                .failures
                .first()
                .map(|f| f.file.clone())
                .unwrap_or_default();
            return Err(UploadError::Bailed {
                file,
                result: Box::new(result),
            });
        }
        if !result.is_success() {
            return Err(UploadError::Failed {
                result: Box::new(result),
            });
        }

        Ok(result)
    }

    fn base_dir(&self, directory: &Path) -> Result<PathBuf, ConfigError> {
        let dir = self.config.build_root.as_deref().unwrap_or(directory);
        std::path::absolute(dir).map_err(config_io_error)
    }
}

fn config_io_error(e: std::io::Error) -> ConfigError {
    ConfigError {
        problems: vec![format!("cannot resolve working directory: {e}")],
    }
}
