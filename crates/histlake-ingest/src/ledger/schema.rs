//! SQLite schema for the ingestion ledger

use crate::error::Result;
use rusqlite::Connection;

/// Initialize ledger schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Processing history, one row per slot
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS processed_files (
            file_name TEXT NOT NULL,
            plant_name TEXT NOT NULL,
            machine_no TEXT NOT NULL,
            data_source TEXT NOT NULL,
            processed_at TEXT NOT NULL,

            -- Provenance
            source_path TEXT,
            source_archive TEXT,
            sha256 TEXT,
            row_count INTEGER,
            output_paths TEXT NOT NULL DEFAULT '[]',  -- JSON array

            PRIMARY KEY (file_name, plant_name, machine_no, data_source)
        )
        "#,
        [],
    )?;

    // Per-equipment parameter catalog
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS param_master (
            plant_name TEXT NOT NULL,
            machine_no TEXT NOT NULL,
            data_source TEXT NOT NULL,
            param_id TEXT NOT NULL,

            description TEXT,
            unit TEXT,
            column_position INTEGER NOT NULL,

            first_seen_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,

            PRIMARY KEY (plant_name, machine_no, data_source, param_id)
        )
        "#,
        [],
    )?;

    // Global parameter-ID dictionary
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS parameter_id_master (
            param_id TEXT PRIMARY KEY,
            name_en TEXT NOT NULL,
            name_ja TEXT,
            registered_at TEXT NOT NULL
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_processed_scope ON processed_files(plant_name, machine_no, data_source)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_param_master_param ON param_master(param_id)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(tables, vec!["param_master", "parameter_id_master", "processed_files"]);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert!(init_schema(&conn).is_ok());
    }
}
