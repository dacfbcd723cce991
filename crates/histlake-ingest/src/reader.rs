//! Historian CSV reading
//!
//! The pipeline only depends on [`SensorReader`]. [`HistorianCsvReader`]
//! understands the plant historian export layout:
//!
//! ```text
//! Datetime,TAG001,TAG002          <- param IDs
//! ,Feed flow,Reactor temp         <- optional descriptions
//! ,m3/h,degC                      <- optional units
//! 2023-01-01 00:00:00,1.5,80.2
//! 2023-01-01 00:01:00,Bad,80.4    <- non-numeric markers become nulls
//! ```

use crate::error::{IngestError, Result};
use chrono::NaiveDateTime;
use histlake_common::HeaderField;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Timestamp layouts seen in historian exports
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Rows allowed between the ID row and the first data row
const MAX_METADATA_ROWS: usize = 2;

/// One parameter's values, aligned with [`SensorTable::timestamps`]
#[derive(Debug, Clone, PartialEq)]
pub struct SensorColumn {
    pub param_id: String,
    pub values: Vec<Option<f64>>,
}

/// In-memory table of one export
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SensorTable {
    pub timestamps: Vec<NaiveDateTime>,
    pub columns: Vec<SensorColumn>,
}

impl SensorTable {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn param_ids(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.param_id.as_str())
    }
}

/// Table plus the header metadata registered in the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    pub table: SensorTable,
    pub header: Vec<HeaderField>,
}

/// Parses a source file into a table and its header metadata
pub trait SensorReader {
    fn read(&self, path: &Path) -> Result<ParsedFile>;
}

/// Reader for the plant historian CSV export layout
#[derive(Debug, Clone, Copy, Default)]
pub struct HistorianCsvReader;

impl HistorianCsvReader {
    pub fn new() -> Self {
        Self
    }
}

impl SensorReader for HistorianCsvReader {
    fn read(&self, path: &Path) -> Result<ParsedFile> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| IngestError::parse(path, e.to_string()))?;

        let mut records = reader.records();

        let id_row = match records.next() {
            Some(row) => row.map_err(|e| IngestError::parse(path, e.to_string()))?,
            None => return Err(IngestError::parse(path, "file is empty")),
        };
        let param_ids = parse_id_row(path, &id_row)?;

        let mut metadata: Vec<csv::StringRecord> = Vec::new();
        let mut table = SensorTable {
            timestamps: Vec::new(),
            columns: param_ids
                .iter()
                .map(|id| SensorColumn {
                    param_id: id.clone(),
                    values: Vec::new(),
                })
                .collect(),
        };

        for row in records {
            let row = row.map_err(|e| IngestError::parse(path, e.to_string()))?;
            let line = row.position().map_or(0, |p| p.line());

            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }

            let first = row.get(0).unwrap_or_default().trim();
            let Some(timestamp) = parse_timestamp(first) else {
                if table.is_empty() && metadata.len() < MAX_METADATA_ROWS {
                    metadata.push(row);
                    continue;
                }
                let message = if table.is_empty() {
                    format!("line {line}: too many header rows before the first timestamp")
                } else {
                    format!("line {line}: expected a timestamp, found '{first}'")
                };
                return Err(IngestError::parse(path, message));
            };

            if let Some(extra) = row.iter().skip(param_ids.len() + 1).find(|c| !c.trim().is_empty()) {
                return Err(IngestError::parse(
                    path,
                    format!("line {line}: value '{extra}' has no header column"),
                ));
            }

            table.timestamps.push(timestamp);
            for (index, column) in table.columns.iter_mut().enumerate() {
                column.values.push(row.get(index + 1).and_then(parse_value));
            }
        }

        let header = param_ids
            .into_iter()
            .enumerate()
            .map(|(position, param_id)| HeaderField {
                param_id,
                description: metadata_cell(metadata.first(), position),
                unit: metadata_cell(metadata.get(1), position),
                position,
            })
            .collect();

        debug!(
            path = %path.display(),
            rows = table.len(),
            params = table.columns.len(),
            "Parsed historian export"
        );

        Ok(ParsedFile { table, header })
    }
}

fn parse_id_row(path: &Path, row: &csv::StringRecord) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for (index, cell) in row.iter().enumerate().skip(1) {
        let id = cell.trim().trim_start_matches('\u{feff}').to_string();
        if id.is_empty() {
            return Err(IngestError::parse(path, format!("header column {index} has no parameter ID")));
        }
        if !seen.insert(id.clone()) {
            return Err(IngestError::parse(path, format!("duplicate parameter ID '{id}'")));
        }
        ids.push(id);
    }

    if ids.is_empty() {
        return Err(IngestError::parse(path, "header has no parameter columns"));
    }
    Ok(ids)
}

fn metadata_cell(row: Option<&csv::StringRecord>, position: usize) -> Option<String> {
    row.and_then(|r| r.get(position + 1))
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
}

/// Parse a timestamp cell in any of the supported layouts
pub fn parse_timestamp(cell: &str) -> Option<NaiveDateTime> {
    let cell = cell.trim().trim_start_matches('\u{feff}');
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(cell, format).ok())
}

/// Numeric cell, or `None` for blanks and historian status markers
fn parse_value(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
