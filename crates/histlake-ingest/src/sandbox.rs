//! Archive entry path validation
//!
//! Every entry name read from an archive goes through [`check`] before a
//! single byte of it is written. Only plain relative paths survive; the
//! normalized result is guaranteed to stay inside whatever root it is
//! joined onto.

use crate::error::IngestError;
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

/// Fixed name of the directory archive entries are extracted into
pub const SANDBOX_DIR_NAME: &str = "__extracted_csvs__";

/// Why an entry path was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathViolation {
    /// A `..` segment appears somewhere in the path
    ParentTraversal,
    /// Rooted path, or one carrying a drive prefix
    Absolute,
    /// Nothing left to write once `.` and empty segments are dropped
    Empty,
}

impl fmt::Display for PathViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            PathViolation::ParentTraversal => "contains a parent-directory segment",
            PathViolation::Absolute => "is an absolute path",
            PathViolation::Empty => "is empty",
        };
        f.write_str(reason)
    }
}

/// Validate an archive-internal path and return its normalized relative form.
///
/// Both `/` and `\` separate segments, so names produced on Windows are held
/// to the same rules.
///
/// # Examples
///
/// ```
/// use histlake_ingest::sandbox::{check, PathViolation};
/// use std::path::PathBuf;
///
/// assert_eq!(check("inner/./b.csv"), Ok(PathBuf::from("inner/b.csv")));
/// assert_eq!(check("../evil.csv"), Err(PathViolation::ParentTraversal));
/// assert_eq!(check("/etc/passwd"), Err(PathViolation::Absolute));
/// ```
pub fn check(entry: &str) -> Result<PathBuf, PathViolation> {
    let unified = entry.replace('\\', "/");

    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(PathViolation::Absolute);
    }

    let mut normalized = PathBuf::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {},
            ".." => return Err(PathViolation::ParentTraversal),
            name => normalized.push(name),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(PathViolation::Empty);
    }

    Ok(normalized)
}

/// Run [`check`], logging a warning for each rejected entry.
pub fn admit(entry: &str) -> Option<PathBuf> {
    match check(entry) {
        Ok(relative) => Some(relative),
        Err(violation) => {
            let err = IngestError::PathSafety {
                entry: entry.to_string(),
                reason: violation.to_string(),
            };
            warn!(error = %err, "Rejected unsafe archive entry");
            None
        },
    }
}

/// Allow/deny view of [`admit`].
pub fn validate(entry: &str) -> bool {
    admit(entry).is_some()
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
