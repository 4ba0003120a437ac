//! Persists the failure list of a run as JSON.

use std::path::Path;

use bucket_push_upload_models::FailureRecord;

/// Default error log file name.
pub const DEFAULT_ERROR_LOG: &str = "upload.error.log";

/// Errors writing the error log.
#[derive(Debug, thiserror::Error)]
pub enum ErrorLogError {
    /// Serialization failed.
    #[error("Failed to serialize error log: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing the file failed.
    #[error("Failed to write error log: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes `failures` to `path` as a JSON array of
/// `{file, err: {code, message, name}}` records.
///
/// # Errors
///
/// Returns [`ErrorLogError`] if the records cannot be serialized or the file
/// cannot be written.
pub async fn write(path: &Path, failures: &[FailureRecord]) -> Result<(), ErrorLogError> {
    let json = serde_json::to_vec_pretty(failures)?;
    tokio::fs::write(path, json).await?;
    log::info!(
        "Wrote {} failure(s) to {}",
        failures.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use bucket_push_upload_models::{FailureDetail, FailureKind};

    use super::*;

    #[tokio::test]
    async fn writes_structured_records() {
        let tmp = std::env::temp_dir().join("bucket_push_error_log");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        let path = tmp.join(DEFAULT_ERROR_LOG);

        let failures = [FailureRecord {
            file: PathBuf::from("/dist/app.js"),
            key: "static/app.js".to_string(),
            err: FailureDetail {
                code: "RequestTimeTooSkewed".to_string(),
                message: "clock skew".to_string(),
                name: "ServiceError".to_string(),
                kind: FailureKind::Transfer,
            },
        }];
        write(&path, &failures).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written[0]["file"], "/dist/app.js");
        assert_eq!(written[0]["err"]["code"], "RequestTimeTooSkewed");
        assert_eq!(written[0]["err"]["name"], "ServiceError");
        assert!(written[0].get("key").is_none());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
