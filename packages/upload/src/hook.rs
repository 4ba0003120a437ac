//! How an upload run is invoked and how its result settles.
//!
//! A run is either standalone (the caller names the base directory and gets
//! every failure back as an `Err`) or part of a build pipeline (the build
//! supplies its output directory and an [`ErrorSink`] that collects build
//! errors). In a pipeline, failures go to the sink and the run still
//! returns `Ok` unless `quit_on_error` is set.

use std::path::{Path, PathBuf};

use bucket_push_upload_models::RunResult;

use crate::UploadError;

/// Receives errors on behalf of a build pipeline.
pub trait ErrorSink: Send + Sync {
    /// Records one error.
    fn report(&self, error: &UploadError);
}

/// Where a run was started from.
pub enum Invocation<'a> {
    /// Called directly with an explicit base directory.
    Standalone {
        /// Base directory for key mapping and default patterns.
        base_dir: PathBuf,
    },
    /// Called after a build step.
    Pipeline {
        /// The build's output directory.
        output_dir: PathBuf,
        /// The build's error channel.
        sink: &'a dyn ErrorSink,
    },
}

impl Invocation<'_> {
    /// The directory the invocation supplies.
    #[must_use]
    pub fn directory(&self) -> &Path {
        match self {
            Self::Standalone { base_dir } => base_dir,
            Self::Pipeline { output_dir, .. } => output_dir,
        }
    }

    /// Applies the settlement policy to a run's raw outcome.
    ///
    /// # Errors
    ///
    /// Standalone: returns `outcome` unchanged. Pipeline: reports the error
    /// to the sink (one report per failed file), then returns it only when
    /// `quit_on_error` is set.
    pub fn settle(
        &self,
        outcome: Result<RunResult, UploadError>,
        quit_on_error: bool,
    ) -> Result<RunResult, UploadError> {
        let Self::Pipeline { sink, .. } = self else {
            return outcome;
        };
        let error = match outcome {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        match error.run_result() {
            Some(result) => {
                for record in &result.failures {
                    sink.report(&UploadError::File(Box::new(record.clone())));
                }
            }
            None => sink.report(&error),
        }

        if quit_on_error {
            return Err(error);
        }

        log::warn!("Upload finished with errors (reported to the build): {error}");
        Ok(error.into_run_result().unwrap_or_default())
    }
}
