//! Connection parameters for an S3-compatible bucket.
//!
//! Region, bucket and endpoint come from configuration. Credentials only
//! ever come from the environment:
//!
//! | Variable | Fallback |
//! |---|---|
//! | `BUCKET_PUSH_ACCESS_KEY_ID` | `AWS_ACCESS_KEY_ID` |
//! | `BUCKET_PUSH_SECRET_ACCESS_KEY` | `AWS_SECRET_ACCESS_KEY` |

use bucket_push_upload::ConfigError;

/// Primary access key variable.
pub const ACCESS_KEY_ENV: &str = "BUCKET_PUSH_ACCESS_KEY_ID";
/// Primary secret key variable.
pub const SECRET_KEY_ENV: &str = "BUCKET_PUSH_SECRET_ACCESS_KEY";

const ACCESS_KEY_FALLBACK_ENV: &str = "AWS_ACCESS_KEY_ID";
const SECRET_KEY_FALLBACK_ENV: &str = "AWS_SECRET_ACCESS_KEY";

/// Everything needed to talk to one bucket.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Bucket region, e.g. `us-east-1`.
    pub region: String,
    /// Bucket name.
    pub bucket: String,
    /// Custom endpoint for S3-compatible services. Enables path-style
    /// addressing.
    pub endpoint: Option<String>,
    /// Access key id.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

impl ConnectionSettings {
    /// Builds settings with credentials read from the process environment.
    #[must_use]
    pub fn from_env(region: String, bucket: String, endpoint: Option<String>) -> Self {
        Self::with_credentials_from(region, bucket, endpoint, |name| std::env::var(name).ok())
    }

    /// Builds settings with credentials looked up through `lookup`.
    ///
    /// Each credential prefers its `BUCKET_PUSH_*` variable and falls back
    /// to the standard AWS one. Empty values count as unset.
    #[must_use]
    pub fn with_credentials_from(
        region: String,
        bucket: String,
        endpoint: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let read = |primary: &str, fallback: &str| {
            lookup(primary)
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(fallback).filter(|v| !v.is_empty()))
        };

        Self {
            region,
            bucket,
            endpoint: endpoint.filter(|e| !e.trim().is_empty()),
            access_key_id: read(ACCESS_KEY_ENV, ACCESS_KEY_FALLBACK_ENV),
            secret_access_key: read(SECRET_KEY_ENV, SECRET_KEY_FALLBACK_ENV),
        }
    }

    /// Checks that every required parameter is present.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming every missing parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.region.trim().is_empty() {
            problems.push("region not specified".to_string());
        }
        if self.access_key_id.is_none() {
            problems.push(format!("accessKeyId not specified (set {ACCESS_KEY_ENV})"));
        }
        if self.secret_access_key.is_none() {
            problems.push(format!(
                "accessKeySecret not specified (set {SECRET_KEY_ENV})"
            ));
        }
        if self.bucket.trim().is_empty() {
            problems.push("bucket not specified".to_string());
        }

        ConfigError::check(problems)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn prefers_bucket_push_credentials() {
        let settings = ConnectionSettings::with_credentials_from(
            "us-east-1".to_string(),
            "assets".to_string(),
            None,
            env(&[
                (ACCESS_KEY_ENV, "bp-key"),
                ("AWS_ACCESS_KEY_ID", "aws-key"),
                ("AWS_SECRET_ACCESS_KEY", "aws-secret"),
            ]),
        );

        assert_eq!(settings.access_key_id.as_deref(), Some("bp-key"));
        assert_eq!(settings.secret_access_key.as_deref(), Some("aws-secret"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn empty_variables_fall_through() {
        let settings = ConnectionSettings::with_credentials_from(
            "us-east-1".to_string(),
            "assets".to_string(),
            Some(String::new()),
            env(&[(ACCESS_KEY_ENV, ""), ("AWS_ACCESS_KEY_ID", "aws-key")]),
        );

        assert_eq!(settings.access_key_id.as_deref(), Some("aws-key"));
        assert_eq!(settings.endpoint, None);
    }

    #[test]
    fn reports_every_missing_parameter() {
        let settings =
            ConnectionSettings::with_credentials_from(String::new(), String::new(), None, env(&[]));

        let err = settings.validate().unwrap_err();

        assert_eq!(err.problems.len(), 4);
        assert!(err.problems[0].starts_with("region"));
        assert!(err.problems[1].starts_with("accessKeyId"));
        assert!(err.problems[2].starts_with("accessKeySecret"));
        assert!(err.problems[3].starts_with("bucket"));
    }

    #[test]
    fn debug_hides_secret() {
        let settings = ConnectionSettings {
            secret_access_key: Some("hunter2".to_string()),
            ..ConnectionSettings::default()
        };

        assert!(!format!("{settings:?}").contains("hunter2"));
    }
}
