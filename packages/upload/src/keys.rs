//! Local path → remote key mapping and URL cleanup.
//!
//! Keys always use forward slashes regardless of the host platform, and
//! never contain runs of consecutive separators.

use std::path::Path;

use crate::config::KeyOverride;

/// Maps a local file to its remote object key.
///
/// The key suffix comes from `key_override` when it returns `Some`, and
/// otherwise from the file's location relative to `base_dir`. A file outside
/// `base_dir` gets an empty suffix, which maps it to exactly `prefix`.
#[must_use]
pub fn map_to_remote_key(
    local: &Path,
    base_dir: &Path,
    prefix: &str,
    key_override: Option<&KeyOverride>,
) -> String {
    let suffix = key_override
        .and_then(|f| f(local))
        .unwrap_or_else(|| relative_to_base(local, base_dir));

    join_key(prefix, &suffix)
}

/// Returns `local` relative to `base_dir` with forward slashes, or an empty
/// string when `local` does not live under `base_dir`.
#[must_use]
pub fn relative_to_base(local: &Path, base_dir: &Path) -> String {
    let local = to_slash(local);
    let mut base = to_slash(base_dir);
    if !base.ends_with('/') {
        base.push('/');
    }

    local
        .strip_prefix(base.as_str())
        .map(str::to_string)
        .unwrap_or_default()
}

/// Joins a destination prefix and a key suffix with a single `/`.
#[must_use]
pub fn join_key(prefix: &str, suffix: &str) -> String {
    let prefix = prefix.replace('\\', "/");
    let suffix = suffix.replace('\\', "/");

    if suffix.is_empty() {
        return collapse_separators(&prefix);
    }
    if prefix.is_empty() {
        return collapse_separators(&suffix);
    }

    collapse_separators(&format!("{prefix}/{suffix}"))
}

/// Converts a path to a string with `/` separators.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn collapse_separators(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_slash = false;
    for c in s.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Cleans up a URL returned by the store.
///
/// Splits on runs of two or more slashes, keeps the first segment as the
/// scheme, and rejoins the rest with single slashes, so exactly one `//`
/// follows the scheme: `http://a.com//b///c` → `http://a.com/b/c`.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let parts = split_on_slash_runs(url);
    match parts.split_first() {
        Some((scheme, rest)) if !rest.is_empty() => format!("{scheme}//{}", rest.join("/")),
        _ => url.to_string(),
    }
}

fn split_on_slash_runs(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'/' {
            let run_start = i;
            while i < bytes.len() && bytes[i] == b'/' {
                i += 1;
            }
            if i - run_start >= 2 {
                parts.push(&s[start..run_start]);
                start = i;
            }
        } else {
            i += 1;
        }
    }

    parts.push(&s[start..]);
    parts
}
