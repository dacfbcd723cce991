//! Ingestion run configuration

use crate::collector::CollectorOptions;
use crate::error::{IngestError, Result};
use histlake_common::Scope;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Defaults
// ============================================================================

/// Dataset root used when none is given
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Ledger database used when none is given
pub const DEFAULT_DB_PATH: &str = "history.db";

/// Historian system most exports come from
pub const DEFAULT_DATA_SOURCE: &str = "pi";

/// Everything one `process_targets` run needs besides the targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Root of the partitioned Parquet dataset
    pub output_dir: PathBuf,

    /// SQLite ledger file
    pub db_path: PathBuf,

    pub plant_name: String,
    pub machine_no: String,
    pub data_source: String,

    /// Substrings a CSV file name must contain (any of them); empty keeps all
    #[serde(default)]
    pub file_name_patterns: Vec<String>,

    /// Where to put extraction sandboxes instead of beside each archive
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Remove extracted CSVs once the batch is done
    #[serde(default)]
    pub cleanup_extracted: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            plant_name: String::new(),
            machine_no: String::new(),
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            file_name_patterns: Vec::new(),
            scratch_dir: None,
            cleanup_extracted: false,
        }
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Scope every file of the run is ingested into
    pub fn scope(&self) -> Result<Scope> {
        Scope::new(&self.plant_name, &self.machine_no, &self.data_source)
            .map_err(|e| IngestError::config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.scope()?;

        if self.output_dir.as_os_str().is_empty() {
            return Err(IngestError::config("output directory must not be empty"));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(IngestError::config("ledger path must not be empty"));
        }
        if self.file_name_patterns.iter().any(|p| p.is_empty()) {
            return Err(IngestError::config("file name patterns must not be empty strings"));
        }

        Ok(())
    }

    pub fn collector_options(&self) -> CollectorOptions {
        CollectorOptions {
            scratch_root: self.scratch_dir.clone(),
            file_name_patterns: self.file_name_patterns.clone(),
        }
    }
}

/// Builder for [`IngestConfig`]
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    pub fn scope(
        mut self,
        plant_name: impl Into<String>,
        machine_no: impl Into<String>,
        data_source: impl Into<String>,
    ) -> Self {
        self.config.plant_name = plant_name.into();
        self.config.machine_no = machine_no.into();
        self.config.data_source = data_source.into();
        self
    }

    pub fn file_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.file_name_patterns.push(pattern.into());
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn cleanup_extracted(mut self, cleanup: bool) -> Self {
        self.config.cleanup_extracted = cleanup;
        self
    }

    /// Finish and validate
    pub fn build(self) -> Result<IngestConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
