//! Ingestion ledger
//!
//! SQLite-backed record of which files have been ingested into which scope,
//! plus the parameter catalogs discovered in their headers. The ledger is the
//! only writer of these tables and the single source of truth for skip
//! decisions: a dataset file on disk without a history row is simply
//! reprocessed next run.
//!
//! Per-file work goes through [`IngestionLedger::within_file_transaction`],
//! which holds the connection lock and an `IMMEDIATE` transaction for the
//! whole check → register → write → mark sequence.

pub mod schema;

use crate::error::{IngestError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use histlake_common::{
    HeaderField, ParamMasterRecord, ParameterIdRecord, ProcessedFileRecord, Scope, Slot,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// How long a statement waits on a database locked by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Row counts of the ledger tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerCounts {
    pub processed_files: u64,
    pub param_master: u64,
    pub parameter_ids: u64,
}

/// Handle on the ledger database
#[derive(Debug, Clone)]
pub struct IngestionLedger {
    db: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl IngestionLedger {
    /// Open (creating if needed) the ledger database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        schema::init_schema(&conn)?;

        info!(path = %path.display(), "Opened ingestion ledger");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory ledger
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file, or `None` for an in-memory ledger
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the connection, surfacing any error SQLite reports on shutdown.
    ///
    /// Fails with [`IngestError::LedgerUnavailable`] while clones of this
    /// handle are still alive.
    pub fn close(self) -> Result<()> {
        let mutex = Arc::try_unwrap(self.db)
            .map_err(|_| IngestError::LedgerUnavailable("ledger handle is still shared".into()))?;
        let conn = mutex
            .into_inner()
            .map_err(|e| IngestError::LedgerUnavailable(e.to_string()))?;
        conn.close().map_err(|(_, e)| IngestError::Ledger(e))?;
        debug!("Closed ingestion ledger");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| IngestError::LedgerUnavailable(format!("connection lock poisoned: {e}")))
    }

    // ========================================================================
    // Core Operations
    // ========================================================================

    /// True iff a history row exists for exactly this slot
    pub fn is_processed(&self, slot: &Slot) -> Result<bool> {
        let conn = self.lock()?;
        is_processed(&conn, slot)
    }

    /// Insert the slot's history row, or refresh its timestamp.
    ///
    /// Callers must only mark a slot once its dataset output is durable.
    pub fn mark_processed(&self, slot: &Slot, processed_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO processed_files (file_name, plant_name, machine_no, data_source, processed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(file_name, plant_name, machine_no, data_source) DO UPDATE SET
                processed_at = excluded.processed_at
            "#,
            params![
                slot.file_name,
                slot.scope.plant_name(),
                slot.scope.machine_no(),
                slot.scope.data_source(),
                sql_time(&processed_at),
            ],
        )?;
        Ok(())
    }

    /// Register a file header's parameters for `scope`.
    ///
    /// Returns the parameter IDs that were new to the global dictionary.
    pub fn register_header(&self, scope: &Scope, fields: &[HeaderField]) -> Result<Vec<String>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let registered = register_header(&tx, scope, fields, Utc::now())?;
        tx.commit()?;
        Ok(registered)
    }

    /// Run `work` inside one `IMMEDIATE` transaction.
    ///
    /// Everything `work` does through the [`FileTransaction`] commits together
    /// when it returns `Ok` and is rolled back when it returns `Err`.
    pub fn within_file_transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&FileTransaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = work(&FileTransaction { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }

    // ========================================================================
    // Read-Side Helpers
    // ========================================================================

    pub fn processed_record(&self, slot: &Slot) -> Result<Option<ProcessedFileRecord>> {
        let conn = self.lock()?;
        processed_record(&conn, slot)
    }

    /// History rows of one scope, ordered by file name
    pub fn processed_files(&self, scope: &Scope) -> Result<Vec<ProcessedFileRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{PROCESSED_COLUMNS} WHERE plant_name = ?1 AND machine_no = ?2 AND data_source = ?3 ORDER BY file_name"
        ))?;
        let rows = stmt
            .query_map(
                params![scope.plant_name(), scope.machine_no(), scope.data_source()],
                processed_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Parameter catalog of one scope, in column order
    pub fn param_master(&self, scope: &Scope) -> Result<Vec<ParamMasterRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT param_id, description, unit, column_position, first_seen_at, updated_at
            FROM param_master
            WHERE plant_name = ?1 AND machine_no = ?2 AND data_source = ?3
            ORDER BY column_position, param_id
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![scope.plant_name(), scope.machine_no(), scope.data_source()],
                |row| {
                    Ok(ParamMasterRecord {
                        scope: scope.clone(),
                        param_id: row.get(0)?,
                        description: row.get(1)?,
                        unit: row.get(2)?,
                        column_position: usize::try_from(row.get::<_, i64>(3)?).unwrap_or_default(),
                        first_seen_at: parse_time(4, &row.get::<_, String>(4)?)?,
                        updated_at: parse_time(5, &row.get::<_, String>(5)?)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Dictionary entry for a parameter ID
    pub fn parameter_name(&self, param_id: &str) -> Result<Option<ParameterIdRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT param_id, name_en, name_ja, registered_at FROM parameter_id_master WHERE param_id = ?1",
                params![param_id],
                |row| {
                    Ok(ParameterIdRecord {
                        param_id: row.get(0)?,
                        name_en: row.get(1)?,
                        name_ja: row.get(2)?,
                        registered_at: parse_time(3, &row.get::<_, String>(3)?)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn counts(&self) -> Result<LedgerCounts> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<u64> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or_default())
        };
        Ok(LedgerCounts {
            processed_files: count("processed_files")?,
            param_master: count("param_master")?,
            parameter_ids: count("parameter_id_master")?,
        })
    }
}

/// Ledger operations available inside [`IngestionLedger::within_file_transaction`]
pub struct FileTransaction<'a> {
    conn: &'a Connection,
}

impl FileTransaction<'_> {
    pub fn is_processed(&self, slot: &Slot) -> Result<bool> {
        is_processed(self.conn, slot)
    }

    pub fn processed_record(&self, slot: &Slot) -> Result<Option<ProcessedFileRecord>> {
        processed_record(self.conn, slot)
    }

    pub fn register_header(
        &self,
        scope: &Scope,
        fields: &[HeaderField],
        at: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        register_header(self.conn, scope, fields, at)
    }

    /// Upsert the full history row, replacing any earlier provenance
    pub fn mark_processed(&self, record: &ProcessedFileRecord) -> Result<()> {
        let output_paths = serde_json::to_string(&record.output_paths)
            .map_err(histlake_common::CommonError::from)?;
        let row_count = record.row_count.map(|n| i64::try_from(n).unwrap_or(i64::MAX));

        self.conn.execute(
            r#"
            INSERT INTO processed_files (
                file_name, plant_name, machine_no, data_source, processed_at,
                source_path, source_archive, sha256, row_count, output_paths
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(file_name, plant_name, machine_no, data_source) DO UPDATE SET
                processed_at = excluded.processed_at,
                source_path = excluded.source_path,
                source_archive = excluded.source_archive,
                sha256 = excluded.sha256,
                row_count = excluded.row_count,
                output_paths = excluded.output_paths
            "#,
            params![
                record.slot.file_name,
                record.slot.scope.plant_name(),
                record.slot.scope.machine_no(),
                record.slot.scope.data_source(),
                sql_time(&record.processed_at),
                record.source_path.as_deref().map(path_text),
                record.source_archive.as_deref().map(path_text),
                record.sha256,
                row_count,
                output_paths,
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// Statements
// ============================================================================

const PROCESSED_COLUMNS: &str = "SELECT file_name, plant_name, machine_no, data_source, processed_at, \
     source_path, source_archive, sha256, row_count, output_paths FROM processed_files";

fn is_processed(conn: &Connection, slot: &Slot) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            r#"
            SELECT 1 FROM processed_files
            WHERE file_name = ?1 AND plant_name = ?2 AND machine_no = ?3 AND data_source = ?4
            "#,
            params![
                slot.file_name,
                slot.scope.plant_name(),
                slot.scope.machine_no(),
                slot.scope.data_source(),
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn processed_record(conn: &Connection, slot: &Slot) -> Result<Option<ProcessedFileRecord>> {
    let record = conn
        .query_row(
            &format!(
                "{PROCESSED_COLUMNS} WHERE file_name = ?1 AND plant_name = ?2 AND machine_no = ?3 AND data_source = ?4"
            ),
            params![
                slot.file_name,
                slot.scope.plant_name(),
                slot.scope.machine_no(),
                slot.scope.data_source(),
            ],
            processed_from_row,
        )
        .optional()?;
    Ok(record)
}

fn register_header(
    conn: &Connection,
    scope: &Scope,
    fields: &[HeaderField],
    at: DateTime<Utc>,
) -> Result<Vec<String>> {
    let now = sql_time(&at);
    let mut upsert_master = conn.prepare_cached(
        r#"
        INSERT INTO param_master (
            plant_name, machine_no, data_source, param_id,
            description, unit, column_position, first_seen_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
        ON CONFLICT(plant_name, machine_no, data_source, param_id) DO UPDATE SET
            description = COALESCE(excluded.description, param_master.description),
            unit = COALESCE(excluded.unit, param_master.unit),
            column_position = excluded.column_position,
            updated_at = excluded.updated_at
        WHERE COALESCE(excluded.description, param_master.description) IS NOT param_master.description
           OR COALESCE(excluded.unit, param_master.unit) IS NOT param_master.unit
           OR excluded.column_position != param_master.column_position
        "#,
    )?;
    let mut insert_dictionary = conn.prepare_cached(
        r#"
        INSERT INTO parameter_id_master (param_id, name_en, name_ja, registered_at)
        VALUES (?1, ?2, NULL, ?3)
        ON CONFLICT(param_id) DO NOTHING
        "#,
    )?;

    let mut registered = Vec::new();
    for field in fields {
        let position = i64::try_from(field.position).unwrap_or(i64::MAX);
        upsert_master.execute(params![
            scope.plant_name(),
            scope.machine_no(),
            scope.data_source(),
            field.param_id,
            field.description,
            field.unit,
            position,
            now,
        ])?;

        let name_en = field.description.as_deref().unwrap_or(&field.param_id);
        if insert_dictionary.execute(params![field.param_id, name_en, now])? > 0 {
            registered.push(field.param_id.clone());
        }
    }

    if !registered.is_empty() {
        info!(%scope, new_params = ?registered, "Registered new parameter IDs");
    }
    Ok(registered)
}

// ============================================================================
// Conversions
// ============================================================================

fn sql_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn conversion_failure<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn parse_time(column: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_failure(column, e))
}

fn processed_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessedFileRecord> {
    let scope = Scope::new(
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
    )
    .map_err(|e| conversion_failure(1, e))?;
    let output_paths: Vec<PathBuf> =
        serde_json::from_str(&row.get::<_, String>(9)?).map_err(|e| conversion_failure(9, e))?;

    Ok(ProcessedFileRecord {
        slot: Slot::new(row.get::<_, String>(0)?, scope),
        processed_at: parse_time(4, &row.get::<_, String>(4)?)?,
        source_path: row.get::<_, Option<String>>(5)?.map(PathBuf::from),
        source_archive: row.get::<_, Option<String>>(6)?.map(PathBuf::from),
        sha256: row.get(7)?,
        row_count: row
            .get::<_, Option<i64>>(8)?
            .map(|n| u64::try_from(n).unwrap_or_default()),
        output_paths,
    })
}
