//! In-memory [`ObjectStore`] for tests and local rehearsals.
//!
//! Keeps every written object in a map, honors the no-overwrite header, and
//! can be told to fail specific keys or slow down writes so that concurrency
//! and fail-fast behavior can be observed without a network.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::store::{ObjectHead, ObjectStore, PutOptions, PutResponse, StoreError};

/// An object written to a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object body.
    pub body: Vec<u8>,
    /// Headers the object was written with.
    pub headers: BTreeMap<String, String>,
}

/// Map-backed object store.
pub struct MemoryStore {
    base_url: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    put_failures: Mutex<HashMap<String, StoreError>>,
    head_failures: Mutex<HashMap<String, StoreError>>,
    put_delay: Mutex<Option<Duration>>,
    put_log: Mutex<Vec<String>>,
    heads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    /// Creates an empty store whose URLs start with `base_url`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            put_failures: Mutex::new(HashMap::new()),
            head_failures: Mutex::new(HashMap::new()),
            put_delay: Mutex::new(None),
            put_log: Mutex::new(Vec::new()),
            heads: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Stores an object directly, bypassing `put`.
    pub fn insert(&self, key: &str, body: Vec<u8>) {
        lock(&self.objects).insert(
            key.to_string(),
            StoredObject {
                body,
                headers: BTreeMap::new(),
            },
        );
    }

    /// Makes every `put` to `key` fail with `error`.
    pub fn fail_put(&self, key: &str, error: StoreError) {
        lock(&self.put_failures).insert(key.to_string(), error);
    }

    /// Makes every `head` of `key` fail with `error`.
    pub fn fail_head(&self, key: &str, error: StoreError) {
        lock(&self.head_failures).insert(key.to_string(), error);
    }

    /// Delays every `put` by `delay` before it completes.
    pub fn set_put_delay(&self, delay: Duration) {
        *lock(&self.put_delay) = Some(delay);
    }

    /// Whether `key` holds an object.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.objects).contains_key(key)
    }

    /// The object stored under `key`.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        lock(&self.objects).get(key).cloned()
    }

    /// All stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    /// Keys passed to `put`, in call order, including failed attempts.
    #[must_use]
    pub fn put_log(&self) -> Vec<String> {
        lock(&self.put_log).clone()
    }

    /// Number of `put` calls.
    #[must_use]
    pub fn put_count(&self) -> usize {
        lock(&self.put_log).len()
    }

    /// Number of `head` calls.
    #[must_use]
    pub fn head_count(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    /// Highest number of `put` calls observed in flight at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn write(
        &self,
        key: &str,
        local_path: &Path,
        options: &PutOptions,
    ) -> Result<PutResponse, StoreError> {
        let delay = *lock(&self.put_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = lock(&self.put_failures).get(key).cloned() {
            return Err(err);
        }

        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| StoreError::new("ReadError", "LocalReadFailed", e.to_string()))?;

        let mut objects = lock(&self.objects);
        if options.forbids_overwrite() && objects.contains_key(key) {
            return Err(StoreError::new(
                "ServiceError",
                "PreconditionFailed",
                format!("object already exists at {key}"),
            ));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                headers: options.headers.clone(),
            },
        );
        drop(objects);

        Ok(PutResponse {
            url: format!("{}/{key}", self.base_url),
        })
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head(&self, key: &str) -> Result<ObjectHead, StoreError> {
        self.heads.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = lock(&self.head_failures).get(key).cloned() {
            return Err(err);
        }

        lock(&self.objects).get(key).map_or_else(
            || Err(StoreError::not_found(key)),
            |object| {
                Ok(ObjectHead {
                    size: Some(object.body.len() as u64),
                    etag: None,
                })
            },
        )
    }

    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        options: &PutOptions,
    ) -> Result<PutResponse, StoreError> {
        lock(&self.put_log).push(key.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.write(key, local_path, options).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_head_round_trips() {
        let dir = std::env::temp_dir().join("bucket_push_memory_store_put");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("a.txt");
        std::fs::write(&file, b"hello").unwrap();

        let store = MemoryStore::new("http://mem");
        let response = store
            .put("/static/a.txt", &file, &PutOptions::default())
            .await
            .unwrap();

        assert_eq!(response.url, "http://mem//static/a.txt");
        assert_eq!(store.head("/static/a.txt").await.unwrap().size, Some(5));
        assert_eq!(store.put_count(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn no_overwrite_header_rejects_existing_key() {
        let dir = std::env::temp_dir().join("bucket_push_memory_store_precondition");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("a.txt");
        std::fs::write(&file, b"new").unwrap();

        let store = MemoryStore::new("http://mem");
        store.insert("a.txt", b"old".to_vec());

        let mut options = PutOptions::default();
        options.headers.insert(
            crate::store::NO_OVERWRITE_HEADER.0.to_string(),
            crate::store::NO_OVERWRITE_HEADER.1.to_string(),
        );
        let err = store.put("a.txt", &file, &options).await.unwrap_err();

        assert_eq!(err.code, "PreconditionFailed");
        assert_eq!(store.object("a.txt").unwrap().body, b"old");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
