//! The remote object store seam.
//!
//! The orchestrator only ever needs two remote operations: a metadata
//! lookup (`head`) and a write (`put`). Everything about the wire protocol
//! lives behind [`ObjectStore`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use strum_macros::{AsRefStr, Display};

/// Header added to every PUT when overwrite is disabled. The store rejects
/// the write if another writer created the key after the existence check.
pub const NO_OVERWRITE_HEADER: (&str, &str) = ("If-None-Match", "*");

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum StoreErrorKind {
    /// The key holds no object.
    NotFound,
    /// The operation did not finish within its timeout.
    Timeout,
    /// Anything else: network, auth, throttling, preconditions.
    Other,
}

/// Error reported by an [`ObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}-{code}: {message}")]
pub struct StoreError {
    /// Classification used by the orchestrator.
    pub kind: StoreErrorKind,
    /// Error class name (e.g. `ServiceError`, `DispatchFailure`).
    pub name: String,
    /// Provider error code (e.g. `NoSuchKey`, `AccessDenied`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl StoreError {
    /// Creates an error of kind [`StoreErrorKind::Other`].
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: StoreErrorKind::Other,
            name: name.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// The key holds no object.
    #[must_use]
    pub fn not_found(key: &str) -> Self {
        Self {
            kind: StoreErrorKind::NotFound,
            name: "ServiceError".to_string(),
            code: "NoSuchKey".to_string(),
            message: format!("no object at {key}"),
        }
    }

    /// The operation was abandoned after `after`.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: StoreErrorKind::Timeout,
            name: "TimeoutError".to_string(),
            code: "Timeout".to_string(),
            message: format!("operation timed out after {after:?}"),
        }
    }

    /// Whether this error means the key holds no object.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }
}

/// Metadata of an existing remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    /// Content length in bytes, when reported.
    pub size: Option<u64>,
    /// `ETag`, when reported.
    pub etag: Option<String>,
}

/// Per-PUT transport options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
}

impl PutOptions {
    /// Whether the PUT must not replace an existing object.
    #[must_use]
    pub fn forbids_overwrite(&self) -> bool {
        self.headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case(NO_OVERWRITE_HEADER.0) && v == NO_OVERWRITE_HEADER.1)
    }
}

/// Response of a successful PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResponse {
    /// Public URL of the written object. May contain duplicated slashes.
    pub url: String,
}

/// A remote key-value object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads the metadata stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreErrorKind::NotFound`] error when the key is empty,
    /// and any other [`StoreError`] when the lookup itself failed.
    async fn head(&self, key: &str) -> Result<ObjectHead, StoreError>;

    /// Writes the contents of `local_path` to `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write was rejected or could not be
    /// performed.
    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        options: &PutOptions,
    ) -> Result<PutResponse, StoreError>;
}

/// Asks the store whether `key` already holds an object.
///
/// "Not found" is `Ok(false)`; every other lookup failure is returned so
/// callers can tell an absent key from a failed check.
///
/// # Errors
///
/// Returns the [`StoreError`] of a failed lookup.
pub async fn exists(store: &dyn ObjectStore, key: &str) -> Result<bool, StoreError> {
    match store.head(key).await {
        Ok(head) => {
            log::debug!(
                "{key} exists (size {:?}, etag {:?})",
                head.size,
                head.etag.as_deref()
            );
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn exists_is_true_for_stored_keys() {
        let store = MemoryStore::new("https://mem.example.com");
        store.insert("static/app.js", b"x".to_vec());

        assert!(exists(&store, "static/app.js").await.unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_false_not_error() {
        let store = MemoryStore::new("https://mem.example.com");

        assert!(!exists(&store, "static/missing.js").await.unwrap());
    }

    #[tokio::test]
    async fn other_lookup_errors_propagate() {
        let store = MemoryStore::new("https://mem.example.com");
        store.fail_head(
            "static/app.js",
            StoreError::new("ServiceError", "AccessDenied", "denied"),
        );

        let err = exists(&store, "static/app.js").await.unwrap_err();
        assert_eq!(err.code, "AccessDenied");
        assert!(!err.is_not_found());
    }

    #[test]
    fn forbids_overwrite_matches_header_case_insensitively() {
        let mut options = PutOptions::default();
        assert!(!options.forbids_overwrite());

        options
            .headers
            .insert("if-none-match".to_string(), "*".to_string());
        assert!(options.forbids_overwrite());
    }
}
