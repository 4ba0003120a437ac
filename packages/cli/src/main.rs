#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for uploading build artifacts to a bucket.
//!
//! Uses `indicatif-log-bridge` (via [`bucket_push_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and the upload progress bar never fight for the terminal.

mod pipeline;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bucket_push_cli_utils::IndicatifProgress;
use bucket_push_s3::S3Store;
use bucket_push_upload::{Invocation, UploadError, Uploader};
use clap::{Parser, Subcommand};

use crate::pipeline::BuildErrors;
use crate::settings::{DEFAULT_CONFIG_FILE, Overrides, Settings};

#[derive(Parser)]
#[command(name = "bucket_push", about = "Upload build artifacts to object storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the files selected by the config file
    Upload {
        /// Config file
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Build command to run first. Uploads then run in pipeline mode:
        /// failures are reported as build errors instead of failing the
        /// process (unless `quit_on_error` is set).
        #[arg(long)]
        exec: Option<String>,
        /// Build output directory (pipeline mode). Defaults to `build_root`
        /// or the current directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = bucket_push_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Upload {
            config,
            exec,
            output_dir,
            overrides,
        } => {
            let start = Instant::now();
            let settings = Settings::load(&config)?.with_overrides(&overrides);
            let quit_on_error = settings.quit_on_error;
            let (mut config, connection) = settings.into_parts()?;

            let cwd = std::env::current_dir()?;
            let build_errors = BuildErrors::default();
            let invocation = if let Some(command) = exec {
                pipeline::run_build(&command).await?;
                Invocation::Pipeline {
                    output_dir: pipeline::output_root(&mut config, output_dir, cwd),
                    sink: &build_errors,
                }
            } else {
                Invocation::Standalone { base_dir: cwd }
            };

            let checked = settings::validate(&config, &connection)
                .and_then(|()| S3Store::new(&connection));
            let outcome = match checked {
                Ok(store) => {
                    let progress = IndicatifProgress::files_bar(&multi, "Uploading");
                    Uploader::new(config, Arc::new(store))
                        .with_progress(progress)
                        .run(invocation)
                        .await
                }
                Err(e) => invocation.settle(Err(UploadError::Config(e)), quit_on_error),
            };

            for error in build_errors.take() {
                eprintln!("ERROR in bucket_push: {error}");
            }

            match outcome {
                Ok(result) => {
                    println!("{result}");
                    log::info!("Finished in {:.1?}", start.elapsed());
                }
                Err(e) => {
                    if let Some(result) = e.run_result() {
                        println!("{result}");
                    }
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
