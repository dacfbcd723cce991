//! Zip archive expansion into the extraction sandbox
//!
//! Entries are vetted by [`crate::sandbox`] one at a time; rejected entries
//! are skipped and the rest of the archive is still extracted. Entries that
//! cannot be materialized on disk, such as a file colliding with an earlier
//! file entry of the same name, are skipped with a warning too. Only a
//! corrupt or unreadable archive aborts, and only for that archive.

use crate::error::{IngestError, Result};
use crate::sandbox;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Case-insensitive `.csv` suffix check
pub fn is_csv_path(path: &Path) -> bool {
    has_extension(path, "csv")
}

/// Case-insensitive `.zip` suffix check
pub fn is_zip_path(path: &Path) -> bool {
    has_extension(path, "zip")
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

/// Expands zip archives, serializing writes per extraction root
#[derive(Debug, Clone, Default)]
pub struct ArchiveExpander {
    root_locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl ArchiveExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract every safe entry of `archive_path` under `extraction_root`.
    ///
    /// Returns the written files that look like CSVs, in archive order.
    /// Existing files at the same relative paths are overwritten.
    pub fn expand(&self, archive_path: &Path, extraction_root: &Path) -> Result<Vec<PathBuf>> {
        let file = File::open(archive_path)
            .map_err(|e| IngestError::archive(archive_path, e.to_string()))?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))
            .map_err(|e| IngestError::archive(archive_path, e.to_string()))?;

        fs::create_dir_all(extraction_root).map_err(|e| {
            IngestError::archive(archive_path, format!("{}: {e}", extraction_root.display()))
        })?;

        let lock = self.root_lock(extraction_root);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut csv_paths = Vec::new();
        let mut rejected = 0usize;
        let mut skipped = 0usize;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| IngestError::archive(archive_path, format!("entry {index}: {e}")))?;

            let Some(relative) = sandbox::admit(entry.name()) else {
                rejected += 1;
                continue;
            };
            let target = extraction_root.join(&relative);

            if entry.is_dir() {
                if let Err(e) = fs::create_dir_all(&target) {
                    warn!(entry = %relative.display(), error = %e, "Cannot create archive directory, skipping");
                    skipped += 1;
                }
                continue;
            }

            let created = target
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| File::create(&target));
            let mut out = match created {
                Ok(out) => out,
                Err(e) => {
                    warn!(entry = %relative.display(), error = %e, "Cannot create extracted file, skipping");
                    skipped += 1;
                    continue;
                },
            };
            if let Err(e) = io::copy(&mut entry, &mut out) {
                drop(out);
                let _ = fs::remove_file(&target);
                return Err(IngestError::archive(
                    archive_path,
                    format!("entry '{}': {e}", relative.display()),
                ));
            }
            debug!(entry = %relative.display(), target = %target.display(), "Extracted archive entry");

            if is_csv_path(&target) {
                csv_paths.push(target);
            }
        }

        info!(
            archive = %archive_path.display(),
            extracted_csvs = csv_paths.len(),
            rejected_entries = rejected,
            skipped_entries = skipped,
            "Expanded archive"
        );

        Ok(csv_paths)
    }

    fn root_lock(&self, root: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.root_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(root.to_path_buf()).or_default())
    }
}
