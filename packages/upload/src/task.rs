//! The unit of work for one file.
//!
//! `check existence → skip | upload → record`. Every path through
//! [`upload_file`] produces exactly one [`UploadOutcome`]; errors are folded
//! into [`UploadOutcome::Failed`] rather than returned.

use bucket_push_upload_models::{
    FailureDetail, FailureKind, FailureRecord, FileDescriptor, IgnoredFile, UploadOutcome,
    UploadedFile,
};

use crate::cleanup::{self, PendingDirs};
use crate::config::UploadConfig;
use crate::keys::normalize_url;
use crate::store::{self, ObjectStore, PutOptions, StoreError};

macro_rules! per_file {
    ($config:expr, $($arg:tt)+) => {
        if $config.verbose {
            log::info!($($arg)+);
        } else {
            log::debug!($($arg)+);
        }
    };
}

/// Runs the upload task for `file` and returns its outcome.
pub async fn upload_file(
    file: &FileDescriptor,
    config: &UploadConfig,
    store: &dyn ObjectStore,
    dirs: &PendingDirs,
) -> UploadOutcome {
    let outcome = transfer(file, config, store).await;

    if let Some(dir) = dirs.release(&file.path)
        && config.delete_origin
        && config.delete_empty_dir
        && !config.dry_run
    {
        cleanup::remove_dir_if_empty(&dir).await;
    }

    outcome
}

async fn transfer(
    file: &FileDescriptor,
    config: &UploadConfig,
    store: &dyn ObjectStore,
) -> UploadOutcome {
    let path = file.path.display();
    let key = file.key.as_str();

    if config.dry_run {
        per_file!(config, "[dry run] {path} -> {key}");
        return UploadOutcome::Uploaded(UploadedFile {
            file: file.path.clone(),
            key: key.to_string(),
            url: None,
        });
    }

    if !config.overwrite {
        match store::exists(store, key).await {
            Ok(true) => {
                per_file!(config, "{path} -> {key}: ignored (already exists)");
                return UploadOutcome::Ignored(IgnoredFile {
                    file: file.path.clone(),
                    key: key.to_string(),
                });
            }
            Ok(false) => {}
            Err(e) => {
                log::error!("{path} -> {key}: existence check failed: {e}");
                return failed(file, FailureKind::ExistenceCheck, e);
            }
        }
    }

    let options = PutOptions {
        headers: config.headers_for(&file.path),
    };

    let result = match tokio::time::timeout(config.timeout, store.put(key, &file.path, &options))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(StoreError::timeout(config.timeout)),
    };

    match result {
        Ok(response) => {
            let url = normalize_url(&response.url);
            per_file!(config, "{path} -> {key}: uploaded, url => {url}");

            if config.delete_origin {
                cleanup::remove_origin(&file.path).await;
            }

            UploadOutcome::Uploaded(UploadedFile {
                file: file.path.clone(),
                key: key.to_string(),
                url: Some(url),
            })
        }
        Err(e) => {
            log::error!("{path} -> {key}: upload failed: {e}");
            failed(file, FailureKind::Transfer, e)
        }
    }
}

fn failed(file: &FileDescriptor, kind: FailureKind, error: StoreError) -> UploadOutcome {
    UploadOutcome::Failed(FailureRecord {
        file: file.path.clone(),
        key: file.key.clone(),
        err: FailureDetail {
            code: error.code,
            message: error.message,
            name: error.name,
            kind,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::*;
    use crate::memory::MemoryStore;

    fn fixture(name: &str, files: &[&str]) -> (PathBuf, Vec<FileDescriptor>) {
        let tmp = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&tmp);
        let descriptors = files
            .iter()
            .map(|f| {
                let path = tmp.join(f);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(&path, f.as_bytes()).unwrap();
                FileDescriptor {
                    path,
                    relative: (*f).to_string(),
                    key: format!("static/{f}"),
                }
            })
            .collect();
        (tmp, descriptors)
    }

    fn config() -> UploadConfig {
        UploadConfig {
            dist: "static".to_string(),
            ..UploadConfig::default()
        }
    }

    #[tokio::test]
    async fn uploads_absent_file_and_normalizes_url() {
        let (tmp, files) = fixture("bucket_push_task_upload", &["app.js"]);
        let store = MemoryStore::new("https://cdn.example.com/");
        let dirs = PendingDirs::from_files(&files);

        let outcome = upload_file(&files[0], &config(), &store, &dirs).await;

        let UploadOutcome::Uploaded(uploaded) = outcome else {
            panic!("expected upload, got {outcome:?}");
        };
        assert_eq!(
            uploaded.url.as_deref(),
            Some("https://cdn.example.com/static/app.js")
        );
        let stored = store.object("static/app.js").unwrap();
        assert_eq!(stored.body, b"app.js");
        assert_eq!(stored.headers.get("If-None-Match").map(String::as_str), Some("*"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn existing_key_is_ignored_without_put() {
        let (tmp, files) = fixture("bucket_push_task_ignore", &["app.js"]);
        let store = MemoryStore::new("https://cdn.example.com");
        store.insert("static/app.js", b"old".to_vec());
        let dirs = PendingDirs::from_files(&files);

        let outcome = upload_file(&files[0], &config(), &store, &dirs).await;

        assert!(matches!(outcome, UploadOutcome::Ignored(_)));
        assert_eq!(store.put_count(), 0);
        assert_eq!(store.object("static/app.js").unwrap().body, b"old");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn overwrite_skips_the_existence_check() {
        let (tmp, files) = fixture("bucket_push_task_overwrite", &["app.js"]);
        let store = MemoryStore::new("https://cdn.example.com");
        store.insert("static/app.js", b"old".to_vec());
        let dirs = PendingDirs::from_files(&files);
        let config = UploadConfig {
            overwrite: true,
            ..config()
        };

        let outcome = upload_file(&files[0], &config, &store, &dirs).await;

        assert!(matches!(outcome, UploadOutcome::Uploaded(_)));
        assert_eq!(store.head_count(), 0);
        assert_eq!(store.object("static/app.js").unwrap().body, b"app.js");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn failed_existence_check_is_a_failure() {
        let (tmp, files) = fixture("bucket_push_task_head_error", &["app.js"]);
        let store = MemoryStore::new("https://cdn.example.com");
        store.fail_head(
            "static/app.js",
            StoreError::new("ServiceError", "Throttling", "slow down"),
        );
        let dirs = PendingDirs::from_files(&files);

        let outcome = upload_file(&files[0], &config(), &store, &dirs).await;

        let UploadOutcome::Failed(record) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(record.err.kind, FailureKind::ExistenceCheck);
        assert_eq!(record.err.code, "Throttling");
        assert_eq!(store.put_count(), 0);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn rejected_put_records_provider_error() {
        let (tmp, files) = fixture("bucket_push_task_put_error", &["app.js"]);
        let store = MemoryStore::new("https://cdn.example.com");
        store.fail_put(
            "static/app.js",
            StoreError::new("ServiceError", "AccessDenied", "denied"),
        );
        let dirs = PendingDirs::from_files(&files);

        let outcome = upload_file(&files[0], &config(), &store, &dirs).await;

        let UploadOutcome::Failed(record) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(record.err.kind, FailureKind::Transfer);
        assert_eq!(record.err.name, "ServiceError");
        assert_eq!(record.err.message, "denied");
        assert!(files[0].path.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_put_times_out_as_transfer_failure() {
        let (tmp, files) = fixture("bucket_push_task_timeout", &["app.js"]);
        let store = MemoryStore::new("https://cdn.example.com");
        store.set_put_delay(Duration::from_secs(60));
        let dirs = PendingDirs::from_files(&files);
        let config = UploadConfig {
            timeout: Duration::from_secs(1),
            ..config()
        };

        let outcome = upload_file(&files[0], &config, &store, &dirs).await;

        let UploadOutcome::Failed(record) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(record.err.kind, FailureKind::Transfer);
        assert_eq!(record.err.code, "Timeout");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn dry_run_neither_checks_nor_writes_nor_deletes() {
        let (tmp, files) = fixture("bucket_push_task_dry_run", &["js/app.js"]);
        let store = MemoryStore::new("https://cdn.example.com");
        let dirs = PendingDirs::from_files(&files);
        let config = UploadConfig {
            dry_run: true,
            delete_origin: true,
            ..config()
        };

        let outcome = upload_file(&files[0], &config, &store, &dirs).await;

        assert_eq!(
            outcome,
            UploadOutcome::Uploaded(UploadedFile {
                file: files[0].path.clone(),
                key: "static/js/app.js".to_string(),
                url: None,
            })
        );
        assert_eq!(store.head_count(), 0);
        assert_eq!(store.put_count(), 0);
        assert!(files[0].path.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn delete_origin_removes_file_and_emptied_directory() {
        let (tmp, files) = fixture("bucket_push_task_delete", &["js/app.js", "js/vendor.js"]);
        let store = MemoryStore::new("https://cdn.example.com");
        let dirs = PendingDirs::from_files(&files);
        let config = UploadConfig {
            delete_origin: true,
            delete_empty_dir: true,
            ..config()
        };
        let js_dir: &Path = files[0].path.parent().unwrap();

        upload_file(&files[0], &config, &store, &dirs).await;
        assert!(!files[0].path.exists());
        assert!(js_dir.exists(), "directory still has a pending file");

        upload_file(&files[1], &config, &store, &dirs).await;
        assert!(!files[1].path.exists());
        assert!(!js_dir.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
