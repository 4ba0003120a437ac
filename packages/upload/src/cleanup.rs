//! Post-upload local cleanup.
//!
//! Deleting uploaded files and their emptied directories is best-effort:
//! every failure here is logged and never changes a file's outcome.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use bucket_push_upload_models::FileDescriptor;

/// Tracks how many files of the run are still unsettled per parent
/// directory, so a directory is only considered for removal once the last
/// of its files has been handled.
pub struct PendingDirs {
    counts: Mutex<HashMap<PathBuf, usize>>,
}

impl PendingDirs {
    /// Counts the files of a run by parent directory.
    #[must_use]
    pub fn from_files(files: &[FileDescriptor]) -> Self {
        let mut counts: HashMap<PathBuf, usize> = HashMap::new();
        for file in files {
            if let Some(parent) = file.path.parent() {
                *counts.entry(parent.to_path_buf()).or_default() += 1;
            }
        }
        Self {
            counts: Mutex::new(counts),
        }
    }

    /// Marks `file` as settled. Returns its parent directory when no other
    /// file of the run in that directory is still pending.
    pub fn release(&self, file: &Path) -> Option<PathBuf> {
        let parent = file.parent()?;
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = counts.get_mut(parent)?;
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            counts.remove(parent);
            Some(parent.to_path_buf())
        } else {
            None
        }
    }
}

/// Deletes an uploaded local file. Returns whether it was deleted.
pub async fn remove_origin(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log::debug!("Deleted {}", path.display());
            true
        }
        Err(e) => {
            log::warn!("Failed to delete {}: {e}", path.display());
            false
        }
    }
}

/// Removes `dir` if it is an empty directory. The outcome is only logged.
pub async fn remove_dir_if_empty(dir: &Path) {
    match try_remove_empty_dir(dir).await {
        Ok(true) => log::info!("Deleted empty directory {}", dir.display()),
        Ok(false) => log::debug!("Kept non-empty directory {}", dir.display()),
        Err(e) => log::warn!("Failed to clean up directory {}: {e}", dir.display()),
    }
}

async fn try_remove_empty_dir(dir: &Path) -> std::io::Result<bool> {
    let Ok(meta) = tokio::fs::metadata(dir).await else {
        return Ok(false);
    };
    if !meta.is_dir() {
        return Ok(false);
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    if entries.next_entry().await?.is_some() {
        return Ok(false);
    }

    tokio::fs::remove_dir(dir).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(path: &str) -> FileDescriptor {
        FileDescriptor {
            path: PathBuf::from(path),
            relative: String::new(),
            key: String::new(),
        }
    }

    #[test]
    fn release_reports_directory_after_last_file() {
        let dirs = PendingDirs::from_files(&[
            descriptor("/dist/js/a.js"),
            descriptor("/dist/js/b.js"),
            descriptor("/dist/index.html"),
        ]);

        assert_eq!(dirs.release(Path::new("/dist/js/a.js")), None);
        assert_eq!(
            dirs.release(Path::new("/dist/js/b.js")),
            Some(PathBuf::from("/dist/js"))
        );
        assert_eq!(
            dirs.release(Path::new("/dist/index.html")),
            Some(PathBuf::from("/dist"))
        );
        assert_eq!(dirs.release(Path::new("/dist/index.html")), None);
    }

    #[tokio::test]
    async fn removes_only_empty_directories() {
        let tmp = std::env::temp_dir().join("bucket_push_cleanup_dirs");
        let _ = std::fs::remove_dir_all(&tmp);
        let empty = tmp.join("empty");
        let full = tmp.join("full");
        std::fs::create_dir_all(&empty).unwrap();
        std::fs::create_dir_all(&full).unwrap();
        std::fs::write(full.join("keep.txt"), b"x").unwrap();

        remove_dir_if_empty(&empty).await;
        remove_dir_if_empty(&full).await;
        remove_dir_if_empty(&tmp.join("missing")).await;

        assert!(!empty.exists());
        assert!(full.join("keep.txt").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn remove_origin_reports_missing_file() {
        let missing = std::env::temp_dir().join("bucket_push_cleanup_missing.txt");
        let _ = std::fs::remove_file(&missing);

        assert!(!remove_origin(&missing).await);
    }
}
