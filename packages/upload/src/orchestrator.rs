//! Drives the upload tasks of a run to completion.
//!
//! A fixed set of workers pulls files from one shared queue. Workers are
//! plain futures joined on the caller's task, so "concurrent" uploads are
//! interleaved at await points rather than run in parallel. As soon as a
//! worker settles a file it takes the next one, keeping the number of
//! in-flight transfers at the configured limit until the queue drains.
//!
//! With `bail` set, the first failure trips a flag that stops every worker
//! from taking another file. Transfers already in flight are allowed to
//! finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bucket_push_upload_models::{FileDescriptor, RunResult};
use futures::future::join_all;

use crate::cleanup::PendingDirs;
use crate::config::UploadConfig;
use crate::progress::ProgressCallback;
use crate::store::ObjectStore;
use crate::task;

/// What the orchestrator hands back once every worker has stopped.
#[derive(Debug, Default)]
pub struct Orchestrated {
    /// Outcomes recorded during the run.
    pub result: RunResult,
    /// Whether fail-fast stopped the run before the queue drained.
    pub bailed: bool,
}

struct RunState<'a> {
    queue: Mutex<std::vec::IntoIter<FileDescriptor>>,
    result: Mutex<RunResult>,
    tripped: AtomicBool,
    dirs: PendingDirs,
    config: &'a UploadConfig,
    store: &'a dyn ObjectStore,
    progress: &'a dyn ProgressCallback,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Uploads `files` according to `config` and collects every outcome.
pub async fn run(
    files: Vec<FileDescriptor>,
    config: &UploadConfig,
    store: &dyn ObjectStore,
    progress: &dyn ProgressCallback,
) -> Orchestrated {
    let workers = config.worker_count();
    let total = files.len();

    log::info!(
        "Uploading {total} file(s) ({}, {workers} worker(s){}{})",
        config.schedule,
        if config.bail { ", bail on first error" } else { "" },
        if config.dry_run { ", dry run" } else { "" },
    );
    progress.set_total(total as u64);

    let state = RunState {
        dirs: PendingDirs::from_files(&files),
        queue: Mutex::new(files.into_iter()),
        result: Mutex::new(RunResult::default()),
        tripped: AtomicBool::new(false),
        config,
        store,
        progress,
    };

    join_all((0..workers).map(|_| work(&state))).await;

    let result = state
        .result
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    let bailed = state.tripped.load(Ordering::SeqCst);
    if bailed {
        let remaining = total - result.total();
        log::warn!("Stopped after first failure, {remaining} file(s) not attempted");
    }

    Orchestrated { result, bailed }
}

async fn work(state: &RunState<'_>) {
    loop {
        if state.tripped.load(Ordering::SeqCst) {
            break;
        }
        let Some(file) = lock(&state.queue).next() else {
            break;
        };

        state.progress.set_message(file.relative.clone());
        let outcome = task::upload_file(&file, state.config, state.store, &state.dirs).await;

        if outcome.is_failure() && state.config.bail {
            state.tripped.store(true, Ordering::SeqCst);
        }
        lock(&state.result).record(outcome);
        state.progress.inc(1);
    }
}
