//! `bucket_push.toml` loading.
//!
//! File values are read first, CLI flags override them, and the result is
//! split into the upload configuration and the bucket connection.
//! Credentials never come from the file (see
//! [`bucket_push_s3::connection`]).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bucket_push_s3::ConnectionSettings;
use bucket_push_upload::config::{DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT};
use bucket_push_upload::error_log::DEFAULT_ERROR_LOG;
use bucket_push_upload::{
    ConfigError, HeaderInjector, KeyOverride, Patterns, Schedule, UploadConfig,
};
use globset::{GlobBuilder, GlobMatcher};
use serde::Deserialize;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "bucket_push.toml";

/// Errors loading the config file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Settings`].
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// A `[[headers]]` or `[[keys]]` pattern is not a valid glob.
    #[error("Invalid rule pattern {pattern:?}: {source}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying glob error.
        source: globset::Error,
    },

    /// The working directory could not be determined.
    #[error("Cannot determine working directory: {0}")]
    Cwd(std::io::Error),
}

/// `[connection]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionTable {
    /// Bucket region.
    pub region: String,
    /// Bucket name.
    pub bucket: String,
    /// Custom S3-compatible endpoint.
    pub endpoint: Option<String>,
}

/// One `[[headers]]` rule: extra headers for files matching `pattern`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderRule {
    /// Glob matched against the file path relative to the working directory.
    pub pattern: String,
    /// Headers to add.
    pub headers: BTreeMap<String, String>,
}

/// One `[[keys]]` rule: a fixed key suffix for files matching `pattern`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyRule {
    /// Glob matched against the file path relative to the working directory.
    pub pattern: String,
    /// Key suffix joined under `dist`.
    pub key: String,
}

/// Contents of `bucket_push.toml`.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Source glob(s); `!` entries subtract. Defaults to `<base>/**`.
    pub from: Option<Patterns>,
    /// Remote destination prefix.
    pub dist: String,
    /// Base directory for key mapping.
    pub build_root: Option<PathBuf>,
    /// Replace objects that already exist.
    pub overwrite: bool,
    /// Stop starting uploads after the first failure.
    pub bail: bool,
    /// `sequential` or `concurrent`.
    pub schedule: Schedule,
    /// Maximum uploads in flight when concurrent.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-upload timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Delete local files after they upload.
    pub delete_origin: bool,
    /// With `delete_origin`, remove directories left empty.
    #[serde(default = "default_true")]
    pub delete_empty_dir: bool,
    /// Log every file at `info`.
    pub verbose: bool,
    /// Log keys without uploading or deleting.
    pub dry_run: bool,
    /// In pipeline mode, fail the process on upload errors.
    pub quit_on_error: bool,
    /// Error log path. An empty string disables the log.
    #[serde(default = "default_error_log")]
    pub error_log: String,
    /// Bucket connection.
    pub connection: ConnectionTable,
    /// Header rules; every match contributes.
    pub headers: Vec<HeaderRule>,
    /// Key rules; the first match wins.
    pub keys: Vec<KeyRule>,
}

const fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

#[allow(clippy::cast_possible_truncation)]
const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

const fn default_true() -> bool {
    true
}

fn default_error_log() -> String {
    DEFAULT_ERROR_LOG.to_string()
}

/// Flags that override file values.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Default, clap::Args)]
pub struct Overrides {
    /// Compute keys and log them without uploading or deleting anything
    #[arg(long)]
    pub dry_run: bool,
    /// Replace objects that already exist in the bucket
    #[arg(long)]
    pub overwrite: bool,
    /// Stop starting new uploads after the first failure
    #[arg(long)]
    pub bail: bool,
    /// Upload one file at a time
    #[arg(long)]
    pub sequential: bool,
    /// Maximum uploads in flight
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl Settings {
    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Read`] or [`SettingsError::Parse`].
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parses TOML `text`; `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] if `text` is not a valid config.
    pub fn parse(text: &str, path: &Path) -> Result<Self, SettingsError> {
        toml::from_str(text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies CLI flags on top of the file values.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        self.dry_run |= overrides.dry_run;
        self.overwrite |= overrides.overwrite;
        self.bail |= overrides.bail;
        if overrides.sequential {
            self.schedule = Schedule::Sequential;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.concurrency = concurrency;
        }
        self
    }

    /// Splits the settings into the upload configuration and the bucket
    /// connection, reading credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Pattern`] if a rule pattern is invalid.
    pub fn into_parts(self) -> Result<(UploadConfig, ConnectionSettings), SettingsError> {
        let cwd = std::env::current_dir().map_err(SettingsError::Cwd)?;

        let connection = ConnectionSettings::from_env(
            self.connection.region,
            self.connection.bucket,
            self.connection.endpoint,
        );

        let config = UploadConfig {
            from: self.from,
            dist: self.dist,
            build_root: self.build_root,
            key_override: key_override(&self.keys, &cwd)?,
            headers: header_injector(&self.headers, &cwd)?,
            overwrite: self.overwrite,
            bail: self.bail,
            schedule: self.schedule,
            concurrency: self.concurrency,
            timeout: Duration::from_millis(self.timeout_ms),
            delete_origin: self.delete_origin,
            delete_empty_dir: self.delete_empty_dir,
            verbose: self.verbose,
            dry_run: self.dry_run,
            quit_on_error: self.quit_on_error,
            error_log: Some(self.error_log)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        };

        Ok((config, connection))
    }
}

/// Validates the upload configuration and the connection together, so
/// every problem is reported at once.
///
/// # Errors
///
/// Returns a [`ConfigError`] with the problems of both.
pub fn validate(
    config: &UploadConfig,
    connection: &ConnectionSettings,
) -> Result<(), ConfigError> {
    let problems = [config.validate(), connection.validate()]
        .into_iter()
        .filter_map(Result::err)
        .flat_map(|e| e.problems)
        .collect();
    ConfigError::check(problems)
}

fn matcher(pattern: &str) -> Result<GlobMatcher, SettingsError> {
    GlobBuilder::new(pattern.trim_start_matches("./"))
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| SettingsError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// The path rules are matched against: relative to `cwd` when possible.
fn rule_path(path: &Path, cwd: &Path) -> String {
    path.strip_prefix(cwd)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// First matching `[[keys]]` rule wins.
fn key_override(rules: &[KeyRule], cwd: &Path) -> Result<Option<Arc<KeyOverride>>, SettingsError> {
    if rules.is_empty() {
        return Ok(None);
    }

    let compiled = rules
        .iter()
        .map(|rule| Ok((matcher(&rule.pattern)?, rule.key.clone())))
        .collect::<Result<Vec<_>, SettingsError>>()?;
    let cwd = cwd.to_path_buf();

    let f: Arc<KeyOverride> = Arc::new(move |path: &Path| {
        let candidate = rule_path(path, &cwd);
        compiled
            .iter()
            .find(|(m, _)| m.is_match(&candidate))
            .map(|(_, key)| key.clone())
    });
    Ok(Some(f))
}

/// Every matching `[[headers]]` rule contributes, later rules win on
/// conflicting names.
fn header_injector(
    rules: &[HeaderRule],
    cwd: &Path,
) -> Result<Option<Arc<HeaderInjector>>, SettingsError> {
    if rules.is_empty() {
        return Ok(None);
    }

    let compiled = rules
        .iter()
        .map(|rule| Ok((matcher(&rule.pattern)?, rule.headers.clone())))
        .collect::<Result<Vec<_>, SettingsError>>()?;
    let cwd = cwd.to_path_buf();

    let f: Arc<HeaderInjector> = Arc::new(move |path: &Path| {
        let candidate = rule_path(path, &cwd);
        let mut headers = BTreeMap::new();
        for (m, rule_headers) in &compiled {
            if m.is_match(&candidate) {
                headers.extend(rule_headers.clone());
            }
        }
        headers
    });
    Ok(Some(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
from = ["./dist/**", "!./dist/*.html"]
dist = "/static/app"
build_root = "./dist"
schedule = "sequential"
concurrency = 8
timeout_ms = 5000
delete_origin = true
verbose = true
error_log = ""

[connection]
region = "us-east-1"
bucket = "my-bucket"
endpoint = "https://s3.example.com"

[[headers]]
pattern = "**/*.html"
headers = { "Cache-Control" = "no-cache" }

[[headers]]
pattern = "dist/**"
headers = { "Cache-Control" = "max-age=60", "x-amz-meta-build" = "42" }

[[keys]]
pattern = "**/index.html"
key = "index.html"
"#;

    fn parse(text: &str) -> Settings {
        Settings::parse(text, Path::new("bucket_push.toml")).unwrap()
    }

    #[test]
    fn defaults_apply_to_missing_fields() {
        let settings = parse(r#"dist = "static""#);

        assert_eq!(settings.schedule, Schedule::Concurrent);
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.timeout_ms, 30_000);
        assert!(settings.delete_empty_dir);
        assert_eq!(settings.error_log, DEFAULT_ERROR_LOG);
        assert!(settings.from.is_none());
    }

    #[test]
    fn parses_full_file() {
        let settings = parse(FULL);

        assert_eq!(
            settings.from,
            Some(Patterns::List(vec![
                "./dist/**".to_string(),
                "!./dist/*.html".to_string()
            ]))
        );
        assert_eq!(settings.schedule, Schedule::Sequential);
        assert_eq!(settings.connection.bucket, "my-bucket");
        assert_eq!(settings.headers.len(), 2);
        assert_eq!(settings.keys[0].key, "index.html");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Settings::parse("dist = \"x\"\nbucket = \"y\"", Path::new("b.toml")).unwrap_err();

        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn flags_override_file_values() {
        let settings = parse(FULL).with_overrides(&Overrides {
            dry_run: true,
            overwrite: true,
            concurrency: Some(2),
            ..Overrides::default()
        });

        assert!(settings.dry_run);
        assert!(settings.overwrite);
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.schedule, Schedule::Sequential);
    }

    #[test]
    fn builds_upload_config() {
        let (config, connection) = parse(FULL).into_parts().unwrap();

        assert_eq!(config.dist, "/static/app");
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(config.error_log, None);
        assert!(config.delete_origin);
        assert_eq!(connection.region, "us-east-1");
        assert_eq!(connection.endpoint.as_deref(), Some("https://s3.example.com"));
    }

    #[test]
    fn header_rules_merge_in_order() {
        let (config, _) = parse(FULL).into_parts().unwrap();
        let cwd = std::env::current_dir().unwrap();
        let headers = config.headers.unwrap();

        let page = headers(&cwd.join("dist/nested/page.html"));
        assert_eq!(page["Cache-Control"], "max-age=60");
        assert_eq!(page["x-amz-meta-build"], "42");

        let outside = headers(&cwd.join("public/page.html"));
        assert_eq!(outside["Cache-Control"], "no-cache");
        assert!(!outside.contains_key("x-amz-meta-build"));

        assert!(headers(&cwd.join("public/app.js")).is_empty());
    }

    #[test]
    fn first_key_rule_wins_and_others_fall_back() {
        let (config, _) = parse(FULL).into_parts().unwrap();
        let cwd = std::env::current_dir().unwrap();
        let keys = config.key_override.unwrap();

        assert_eq!(
            keys(&cwd.join("dist/docs/index.html")).as_deref(),
            Some("index.html")
        );
        assert_eq!(keys(&cwd.join("dist/app.js")), None);
    }

    #[test]
    fn validate_reports_config_and_connection_problems_together() {
        let config = UploadConfig {
            concurrency: 0,
            ..UploadConfig::default()
        };
        let connection = ConnectionSettings {
            bucket: "assets".to_string(),
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..ConnectionSettings::default()
        };

        let err = validate(&config, &connection).unwrap_err();

        assert_eq!(
            err.problems,
            [
                "dist not specified",
                "concurrency must be at least 1",
                "region not specified"
            ]
        );
    }

    #[test]
    fn invalid_rule_pattern_is_reported() {
        let settings = parse(
            r#"
dist = "x"
[[keys]]
pattern = "dist/[oops"
key = "k"
"#,
        );

        let err = settings.into_parts().err().unwrap();

        assert!(matches!(err, SettingsError::Pattern { .. }));
    }
}
