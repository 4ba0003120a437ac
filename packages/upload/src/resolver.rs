//! Expands source globs into the ordered list of files to upload.
//!
//! Each pattern is anchored at the working directory, its static prefix is
//! walked with `walkdir`, and the entries are matched with `globset`. A
//! pattern prefixed with `!` removes its matches from everything collected
//! so far. `*` never crosses a `/`; `**` does.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use crate::keys::to_slash;

/// Errors that abort file resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The glob could not be compiled.
    #[error("Invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },

    /// Walking a directory failed.
    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        /// Directory being walked.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
}

/// Resolves `patterns` relative to `cwd`.
///
/// Returns absolute file paths, deduplicated, in first-match order.
/// Directories are never returned.
///
/// # Errors
///
/// Returns [`ResolveError`] if a pattern is malformed or a directory under a
/// pattern's root cannot be read.
pub fn resolve(patterns: &[&str], cwd: &Path) -> Result<Vec<PathBuf>, ResolveError> {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for raw in patterns {
        let (negated, pattern) = raw
            .strip_prefix('!')
            .map_or((false, *raw), |rest| (true, rest));

        let matches = expand(pattern, cwd)?;

        if negated {
            let excluded: HashSet<PathBuf> = matches.into_iter().collect();
            files.retain(|f| !excluded.contains(f));
            seen.retain(|f| !excluded.contains(f));
        } else {
            for file in matches {
                if seen.insert(file.clone()) {
                    files.push(file);
                }
            }
        }
    }

    log::debug!("Resolved {} file(s) from {patterns:?}", files.len());
    Ok(files)
}

/// Expands one (non-negated) pattern.
fn expand(pattern: &str, cwd: &Path) -> Result<Vec<PathBuf>, ResolveError> {
    let absolute = anchor(pattern, cwd);
    let matcher = compile(&absolute)?;
    let root = static_root(&absolute);

    if !root.exists() {
        log::debug!("Pattern root {} does not exist", root.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(|source| ResolveError::Walk {
            path: root.clone(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(to_slash(entry.path())) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn compile(pattern: &str) -> Result<GlobMatcher, ResolveError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| ResolveError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Makes `pattern` absolute against `cwd` and drops `.`/`..` segments.
/// `cwd` is escaped so its characters are never read as glob syntax.
fn anchor(pattern: &str, cwd: &Path) -> String {
    let pattern = pattern.replace('\\', "/");
    let joined = if Path::new(&pattern).is_absolute() || pattern.starts_with('/') {
        pattern
    } else {
        format!("{}/{pattern}", globset::escape(&to_slash(cwd)))
    };
    clean(&joined)
}

fn clean(pattern: &str) -> String {
    let rooted = pattern.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in pattern.split('/') {
        match segment {
            "" | "." => {}
            ".." if segments
                .last()
                .is_some_and(|last| *last != ".." && literal(last).is_some()) =>
            {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted { format!("/{joined}") } else { joined }
}

/// The plain text of a glob-free segment, with `[x]` escapes resolved.
/// `None` when the segment contains glob syntax.
fn literal(segment: &str) -> Option<String> {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '[' if i + 2 < chars.len()
                && chars[i + 2] == ']'
                && matches!(chars[i + 1], '[' | ']' | '*' | '?' | '{' | '}') =>
            {
                out.push(chars[i + 1]);
                i += 3;
            }
            '*' | '?' | '[' | '{' => return None,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Some(out)
}

/// The longest leading run of glob-free segments, unescaped.
fn static_root(pattern: &str) -> PathBuf {
    let literal: Vec<String> = pattern.split('/').map_while(literal).collect();

    let root = literal.join("/");
    if root.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(root)
    }
}
