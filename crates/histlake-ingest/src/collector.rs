//! Candidate discovery
//!
//! Turns the user's targets (directories, CSV files, zip archives) into the
//! ordered list of CSV files the pipeline should look at. Archives are
//! expanded into a `__extracted_csvs__` sandbox, either beside the archive
//! or under a configured scratch root.

use crate::archive::{is_csv_path, is_zip_path, ArchiveExpander};
use crate::error::{IngestError, Result};
use crate::sandbox::SANDBOX_DIR_NAME;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A CSV file the pipeline should consider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFile {
    /// Absolute path of the CSV
    pub path: PathBuf,

    /// Archive the CSV was extracted from
    pub source_archive: Option<PathBuf>,

    /// Whether the file is a temporary extraction result
    pub extracted: bool,
}

impl CandidateFile {
    pub fn direct(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source_archive: None,
            extracted: false,
        }
    }

    pub fn extracted(path: impl Into<PathBuf>, archive: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source_archive: Some(archive.into()),
            extracted: true,
        }
    }

    /// Base name used as the processing-history key
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// Archive that could not be expanded
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveFailure {
    pub archive: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct CollectorOptions {
    /// Put sandboxes under this directory instead of beside each archive
    pub scratch_root: Option<PathBuf>,

    /// Keep only CSVs whose file name contains one of these substrings
    pub file_name_patterns: Vec<String>,
}

/// Result of a collection pass
#[derive(Debug, Default)]
pub struct Collection {
    /// Sorted by path, without duplicates
    pub candidates: Vec<CandidateFile>,
    pub archive_failures: Vec<ArchiveFailure>,
    sandbox_dirs: BTreeSet<PathBuf>,
}

impl Collection {
    /// True when no target produced a single candidate
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Sandbox directories archives were expanded into
    pub fn sandbox_dirs(&self) -> impl Iterator<Item = &Path> {
        self.sandbox_dirs.iter().map(PathBuf::as_path)
    }

    /// Remove every sandbox directory created or reused by this pass.
    ///
    /// Returns how many directories were removed.
    pub fn cleanup_extracted(&self) -> Result<usize> {
        let mut removed = 0;
        for dir in &self.sandbox_dirs {
            match fs::remove_dir_all(dir) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(e.into()),
            }
        }
        debug!(removed, "Cleaned up extraction sandboxes");
        Ok(removed)
    }
}

/// Resolves targets into candidate CSV files
#[derive(Debug, Clone, Default)]
pub struct FileCollector {
    options: CollectorOptions,
    expander: ArchiveExpander,
}

impl FileCollector {
    pub fn new(options: CollectorOptions) -> Self {
        Self {
            options,
            expander: ArchiveExpander::new(),
        }
    }

    /// Collect candidates from every target.
    ///
    /// Missing targets and unreadable archives are logged and skipped; an
    /// empty [`Collection`] is the "nothing to do" answer, not an error.
    pub fn collect<P: AsRef<Path>>(&self, targets: &[P]) -> Result<Collection> {
        let mut collection = Collection::default();

        for target in targets {
            let target = target.as_ref();
            let target = std::path::absolute(target).map_err(|e| {
                IngestError::config(format!("invalid target '{}': {e}", target.display()))
            })?;

            if target.is_dir() {
                self.walk_directory(&target, &mut collection);
            } else if target.is_file() {
                self.consider_file(&target, &mut collection);
            } else {
                warn!(target = %target.display(), "Target does not exist, skipping");
            }
        }

        collection.candidates.sort_by(|a, b| a.path.cmp(&b.path));
        collection.candidates.dedup_by(|a, b| a.path == b.path);

        info!(
            targets = targets.len(),
            candidates = collection.candidates.len(),
            archive_failures = collection.archive_failures.len(),
            "Collected candidate files"
        );

        Ok(collection)
    }

    fn walk_directory(&self, dir: &Path, collection: &mut Collection) {
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_sandbox_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to read directory entry");
                    continue;
                },
            };

            if entry.file_type().is_file() {
                self.consider_file(entry.path(), collection);
            }
        }
    }

    fn consider_file(&self, path: &Path, collection: &mut Collection) {
        if is_csv_path(path) {
            if self.matches_patterns(path) {
                collection.candidates.push(CandidateFile::direct(path));
            }
        } else if is_zip_path(path) {
            self.expand_archive(path, collection);
        } else {
            debug!(path = %path.display(), "Ignoring non-CSV file");
        }
    }

    fn expand_archive(&self, archive: &Path, collection: &mut Collection) {
        let sandbox = self.sandbox_root_for(archive);

        match self.expander.expand(archive, &sandbox) {
            Ok(paths) => {
                collection.sandbox_dirs.insert(sandbox);
                collection.candidates.extend(
                    paths
                        .into_iter()
                        .filter(|p| self.matches_patterns(p))
                        .map(|p| CandidateFile::extracted(p, archive)),
                );
            },
            Err(e) => {
                warn!(archive = %archive.display(), error = %e, "Skipping unreadable archive");
                collection.archive_failures.push(ArchiveFailure {
                    archive: archive.to_path_buf(),
                    error: e.to_string(),
                });
            },
        }
    }

    fn sandbox_root_for(&self, archive: &Path) -> PathBuf {
        let base = match (&self.options.scratch_root, archive.parent()) {
            (Some(scratch), _) => scratch.clone(),
            (None, Some(parent)) => parent.to_path_buf(),
            (None, None) => PathBuf::from("."),
        };
        base.join(SANDBOX_DIR_NAME)
    }

    fn matches_patterns(&self, path: &Path) -> bool {
        let patterns = &self.options.file_name_patterns;
        if patterns.is_empty() {
            return true;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        patterns.iter().any(|p| name.contains(p.as_str()))
    }
}

fn is_sandbox_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == SANDBOX_DIR_NAME
}
