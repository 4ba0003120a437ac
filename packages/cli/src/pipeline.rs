//! Build-pipeline mode: run the build, then upload its output.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Mutex, PoisonError};

use bucket_push_upload::{ErrorSink, UploadConfig, UploadError};
use tokio::process::Command;

/// Errors running the build command.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The command could not be started.
    #[error("Failed to start build command {command:?}: {source}")]
    Spawn {
        /// The command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The command exited unsuccessfully.
    #[error("Build command {command:?} failed with {status}")]
    Failed {
        /// The command line.
        command: String,
        /// Exit status of the command.
        status: ExitStatus,
    },
}

/// Runs `command` through the platform shell, inheriting stdio.
///
/// # Errors
///
/// Returns [`BuildError`] if the command cannot be started or exits
/// non-zero.
pub async fn run_build(command: &str) -> Result<(), BuildError> {
    log::info!("Running build: {command}");

    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C");
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c");
        cmd
    };

    let status = cmd
        .arg(command)
        .status()
        .await
        .map_err(|source| BuildError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if !status.success() {
        return Err(BuildError::Failed {
            command: command.to_string(),
            status,
        });
    }

    Ok(())
}

/// The build output directory for a pipeline run.
///
/// An explicit `--output-dir` wins over `build_root`, which is cleared so
/// the run's default pattern and key mapping follow the output directory.
/// Without one, `build_root` is used, then `cwd`.
pub fn output_root(
    config: &mut UploadConfig,
    explicit: Option<PathBuf>,
    cwd: PathBuf,
) -> PathBuf {
    match explicit {
        Some(dir) => {
            if let Some(root) = config.build_root.take() {
                log::debug!(
                    "--output-dir {} replaces build_root {}",
                    dir.display(),
                    root.display()
                );
            }
            dir
        }
        None => config.build_root.clone().unwrap_or(cwd),
    }
}

/// Collects upload errors on behalf of the build so they can be printed
/// once the run settles.
#[derive(Default)]
pub struct BuildErrors {
    errors: Mutex<Vec<String>>,
}

impl BuildErrors {
    /// Takes every error reported so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ErrorSink for BuildErrors {
    fn report(&self, error: &UploadError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.to_string());
    }
}
