//! Columnar dataset output
//!
//! [`ParquetDatasetWriter`] lays files out per equipment scope:
//!
//! ```text
//! <output_root>/<plant_name>/<machine_no>/<data_source>/<year>/<month>/<file stem>.parquet
//! ```
//!
//! Every scope component is a path level, so two scopes never share a file.
//!
//! Each month of a source file becomes its own Parquet file. Files are
//! written beside their final location, fsynced, then renamed, so a path is
//! only ever returned once its contents are durable.

use crate::error::{IngestError, Result};
use crate::reader::SensorTable;
use arrow::array::{ArrayRef, Float64Array, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::Datelike;
use histlake_common::Scope;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Name of the timestamp column in every dataset file
pub const TIMESTAMP_COLUMN: &str = "Datetime";

/// Where a table's output belongs
#[derive(Debug, Clone, Copy)]
pub struct WriteTarget<'a> {
    pub scope: &'a Scope,
    pub file_name: &'a str,
}

/// Emits the columnar dataset for one source file
pub trait DatasetWriter {
    /// Write `table` and return the committed file paths.
    fn write(&self, table: &SensorTable, target: &WriteTarget<'_>) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Clone)]
pub struct ParquetDatasetWriter {
    output_root: PathBuf,
}

impl ParquetDatasetWriter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Directory holding one month of one scope's data
    pub fn partition_dir(&self, scope: &Scope, year: i32, month: u32) -> PathBuf {
        self.output_root
            .join(scope.plant_name())
            .join(scope.machine_no())
            .join(scope.data_source())
            .join(year.to_string())
            .join(format!("{month:02}"))
    }

    fn write_partition(
        &self,
        table: &SensorTable,
        rows: &[usize],
        schema: &Arc<Schema>,
        destination: &Path,
        target: &WriteTarget<'_>,
    ) -> Result<()> {
        let fail = |message: String| IngestError::write(target.file_name, message);

        let timestamps: Vec<i64> = rows
            .iter()
            .map(|&row| table.timestamps[row].and_utc().timestamp_millis())
            .collect();
        let mut columns: Vec<ArrayRef> = vec![Arc::new(TimestampMillisecondArray::from(timestamps))];
        for column in &table.columns {
            let values: Vec<Option<f64>> = rows.iter().map(|&row| column.values[row]).collect();
            columns.push(Arc::new(Float64Array::from(values)));
        }

        let batch = RecordBatch::try_new(Arc::clone(schema), columns)
            .map_err(|e| fail(format!("record batch assembly failed: {e}")))?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| fail(format!("{}: {e}", parent.display())))?;
        }

        let staging = staging_path(destination);
        let result = (|| -> Result<()> {
            let file = File::create(&staging).map_err(|e| fail(e.to_string()))?;
            let mut writer = ArrowWriter::try_new(file, Arc::clone(schema), Some(writer_properties(target)))
                .map_err(|e| fail(format!("parquet writer init failed: {e}")))?;
            writer
                .write(&batch)
                .map_err(|e| fail(format!("parquet write failed: {e}")))?;
            let file = writer
                .into_inner()
                .map_err(|e| fail(format!("parquet close failed: {e}")))?;
            file.sync_all().map_err(|e| fail(e.to_string()))?;
            fs::rename(&staging, destination).map_err(|e| fail(e.to_string()))?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&staging);
        }
        result
    }
}

impl DatasetWriter for ParquetDatasetWriter {
    fn write(&self, table: &SensorTable, target: &WriteTarget<'_>) -> Result<Vec<PathBuf>> {
        let stem = Path::new(target.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IngestError::write(target.file_name, "file name has no stem"))?;

        let schema = dataset_schema(table);

        let mut partitions: BTreeMap<(i32, u32), Vec<usize>> = BTreeMap::new();
        for (row, timestamp) in table.timestamps.iter().enumerate() {
            partitions
                .entry((timestamp.year(), timestamp.month()))
                .or_default()
                .push(row);
        }

        let mut committed = Vec::with_capacity(partitions.len());
        for ((year, month), rows) in &partitions {
            let destination = self
                .partition_dir(target.scope, *year, *month)
                .join(format!("{stem}.parquet"));
            self.write_partition(table, rows, &schema, &destination, target)?;
            debug!(path = %destination.display(), rows = rows.len(), "Committed dataset file");
            committed.push(destination);
        }

        Ok(committed)
    }
}

fn dataset_schema(table: &SensorTable) -> Arc<Schema> {
    let mut fields = vec![Field::new(
        TIMESTAMP_COLUMN,
        DataType::Timestamp(TimeUnit::Millisecond, None),
        false,
    )];
    fields.extend(
        table
            .param_ids()
            .map(|id| Field::new(id, DataType::Float64, true)),
    );
    Arc::new(Schema::new(fields))
}

fn writer_properties(target: &WriteTarget<'_>) -> WriterProperties {
    let metadata = vec![
        KeyValue {
            key: "histlake.scope".to_string(),
            value: Some(target.scope.to_string()),
        },
        KeyValue {
            key: "histlake.source_file".to_string(),
            value: Some(target.file_name.to_string()),
        },
    ];
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(metadata))
        .build()
}

fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::reader::SensorColumn;
    use chrono::NaiveDate;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    fn table() -> SensorTable {
        let at = |m, d| NaiveDate::from_ymd_opt(2023, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap();
        SensorTable {
            timestamps: vec![at(1, 30), at(1, 31), at(2, 1)],
            columns: vec![SensorColumn {
                param_id: "TAG001".to_string(),
                values: vec![Some(1.0), None, Some(3.0)],
            }],
        }
    }

    fn row_count(path: &Path) -> usize {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        reader.map(|batch| batch.unwrap().num_rows()).sum()
    }

    #[test]
    fn test_writes_one_file_per_month() {
        let dir = TempDir::new().unwrap();
        let writer = ParquetDatasetWriter::new(dir.path());
        let scope = Scope::new("P1", "M1", "S1").unwrap();

        let paths = writer
            .write(&table(), &WriteTarget { scope: &scope, file_name: "a.csv" })
            .unwrap();

        assert_eq!(
            paths,
            vec![
                dir.path().join("P1/M1/S1/2023/01/a.parquet"),
                dir.path().join("P1/M1/S1/2023/02/a.parquet"),
            ]
        );
        assert_eq!(row_count(&paths[0]), 2);
        assert_eq!(row_count(&paths[1]), 1);
        assert!(!dir.path().join("P1/M1/S1/2023/01/.a.parquet.tmp").exists());
    }

    #[test]
    fn test_rewrite_overwrites_in_place() {
        let dir = TempDir::new().unwrap();
        let writer = ParquetDatasetWriter::new(dir.path());
        let scope = Scope::new("P1", "M1", "S1").unwrap();
        let target = WriteTarget { scope: &scope, file_name: "a.csv" };

        let first = writer.write(&table(), &target).unwrap();
        let second = writer.write(&table(), &target).unwrap();

        assert_eq!(first, second);
        assert_eq!(row_count(&second[0]), 2);
    }

    #[test]
    fn test_scopes_differing_only_in_data_source_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let writer = ParquetDatasetWriter::new(dir.path());
        let pi = Scope::new("P1", "M1", "pi").unwrap();
        let other = Scope::new("P1", "M1", "other").unwrap();

        let first = writer
            .write(&table(), &WriteTarget { scope: &pi, file_name: "a.csv" })
            .unwrap();
        let second = writer
            .write(&table(), &WriteTarget { scope: &other, file_name: "a.csv" })
            .unwrap();

        assert_eq!(first[0], dir.path().join("P1/M1/pi/2023/01/a.parquet"));
        assert_eq!(second[0], dir.path().join("P1/M1/other/2023/01/a.parquet"));
        assert!(first.iter().chain(&second).all(|p| p.exists()));
    }

    #[test]
    fn test_empty_table_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let scope = Scope::new("P1", "M1", "S1").unwrap();

        let paths = ParquetDatasetWriter::new(dir.path())
            .write(&SensorTable::default(), &WriteTarget { scope: &scope, file_name: "a.csv" })
            .unwrap();

        assert!(paths.is_empty());
    }

    #[test]
    fn test_unwritable_root_is_write_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let scope = Scope::new("P1", "M1", "S1").unwrap();

        let err = ParquetDatasetWriter::new(&blocker)
            .write(&table(), &WriteTarget { scope: &scope, file_name: "a.csv" })
            .unwrap_err();

        assert!(matches!(err, IngestError::Write { .. }));
    }
}
