//! Shared fixtures for ingestion integration tests

#![allow(dead_code)]

use histlake_ingest::reader::SensorTable;
use histlake_ingest::{DatasetWriter, ParquetDatasetWriter, WriteTarget};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zip::write::FileOptions;

/// Small historian export with a description and a unit row
pub const EXPORT_2023_01: &str = "\
Datetime,TAG001,TAG002
,Feed flow,Reactor temp
,m3/h,degC
2023-01-01 00:00:00,1.5,80.2
2023-01-01 00:01:00,Bad,80.4
";

pub fn write_export(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, EXPORT_2023_01).unwrap();
}

pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, body) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Every regular file below `root`, relative to it
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Parquet writer that counts how often it is invoked
#[derive(Clone)]
pub struct CountingWriter {
    inner: ParquetDatasetWriter,
    calls: Arc<AtomicUsize>,
}

impl CountingWriter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            inner: ParquetDatasetWriter::new(output_root),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DatasetWriter for CountingWriter {
    fn write(&self, table: &SensorTable, target: &WriteTarget<'_>) -> histlake_ingest::Result<Vec<PathBuf>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.write(table, target)
    }
}
