#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! S3-compatible [`ObjectStore`] backend.
//!
//! Works against AWS S3 and any service speaking the S3 API (R2, `MinIO`,
//! OSS in S3 mode) when an endpoint is configured.
//!
//! ## Conditional writes
//!
//! An `If-None-Match: *` header in [`PutOptions`] is sent as a conditional
//! `PutObject`, so the service rejects the write with `PreconditionFailed`
//! if the key already exists.

pub mod connection;

use std::path::Path;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use bucket_push_upload::store::NO_OVERWRITE_HEADER;
use bucket_push_upload::{
    ConfigError, ObjectHead, ObjectStore, PutOptions, PutResponse, StoreError, StoreErrorKind,
};

pub use connection::ConnectionSettings;

/// [`ObjectStore`] backed by one S3 bucket.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    base_url: String,
}

impl S3Store {
    /// Creates a client for the bucket described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] listing every missing connection parameter.
    pub fn new(settings: &ConnectionSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let (Some(access_key), Some(secret_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        else {
            return Err(ConfigError {
                problems: vec!["credentials not specified".to_string()],
            });
        };
        let creds = Credentials::new(access_key, secret_key, None, None, "bucket-push-env");

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(settings.region.clone()))
            .credentials_provider(creds)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled());
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        log::debug!(
            "Connecting to bucket {} in {}{}",
            settings.bucket,
            settings.region,
            settings
                .endpoint
                .as_deref()
                .map(|e| format!(" via {e}"))
                .unwrap_or_default()
        );

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            base_url: base_url(settings),
        })
    }

    /// Public URL of `key` in this bucket.
    #[must_use]
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head(&self, key: &str) -> Result<ObjectHead, StoreError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key(key))
            .send()
            .await;

        match result {
            Ok(output) => Ok(ObjectHead {
                size: output
                    .content_length()
                    .and_then(|len| u64::try_from(len).ok()),
                etag: output.e_tag().map(str::to_string),
            }),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(HeadObjectError::is_not_found)
                {
                    return Err(StoreError::not_found(key));
                }
                Err(store_error(&err))
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        options: &PutOptions,
    ) -> Result<PutResponse, StoreError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StoreError::new("IoError", "ReadFailed", e.to_string()))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key(key))
            .body(body);

        let mut extra = Vec::new();
        for (name, value) in &options.headers {
            match name.to_ascii_lowercase().as_str() {
                n if n.eq_ignore_ascii_case(NO_OVERWRITE_HEADER.0) => {
                    request = request.if_none_match(value);
                }
                "content-type" => request = request.content_type(value),
                "cache-control" => request = request.cache_control(value),
                "content-disposition" => request = request.content_disposition(value),
                "content-encoding" => request = request.content_encoding(value),
                "content-language" => request = request.content_language(value),
                _ => extra.push((name.clone(), value.clone())),
            }
        }

        let result = if extra.is_empty() {
            request.send().await
        } else {
            request
                .customize()
                .mutate_request(move |req| {
                    for (name, value) in &extra {
                        if let Err(e) = req.headers_mut().try_insert(name.clone(), value.clone()) {
                            log::warn!("Dropping invalid header {name}: {e}");
                        }
                    }
                })
                .send()
                .await
        };

        result.map_err(|err| store_error(&err))?;

        Ok(PutResponse {
            url: self.object_url(key),
        })
    }
}

/// S3 keys are stored without a leading `/`.
fn object_key(key: &str) -> &str {
    key.trim_start_matches('/')
}

fn base_url(settings: &ConnectionSettings) -> String {
    settings.endpoint.as_ref().map_or_else(
        || {
            format!(
                "https://{}.s3.{}.amazonaws.com",
                settings.bucket, settings.region
            )
        },
        |endpoint| format!("{}/{}", endpoint.trim_end_matches('/'), settings.bucket),
    )
}

/// Flattens an SDK error into the `{name, code, message}` triple recorded
/// for failed files.
fn store_error<E, R>(err: &SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let (name, kind) = match err {
        SdkError::ConstructionFailure(_) => ("ConstructionFailure", StoreErrorKind::Other),
        SdkError::TimeoutError(_) => ("TimeoutError", StoreErrorKind::Timeout),
        SdkError::DispatchFailure(_) => ("DispatchFailure", StoreErrorKind::Other),
        SdkError::ResponseError(_) => ("ResponseError", StoreErrorKind::Other),
        SdkError::ServiceError(_) => ("ServiceError", StoreErrorKind::Other),
        _ => ("SdkError", StoreErrorKind::Other),
    };

    StoreError {
        kind,
        name: name.to_string(),
        code: err.code().unwrap_or(name).to_string(),
        message: err.message().map_or_else(
            || DisplayErrorContext(err).to_string(),
            str::to_string,
        ),
    }
}
