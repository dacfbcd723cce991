//! Domain types shared across histlake
//!
//! A [`Scope`] names one piece of equipment and the historian it was exported
//! from; a [`Slot`] pairs a file name with a scope and is the identity the
//! ingestion ledger uses to decide whether a file has already been handled.

use crate::error::{CommonError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Identity Types
// ============================================================================

/// Equipment / data-source context of an ingested file.
///
/// Two scopes are the same scope exactly when all three components match.
///
/// # Examples
///
/// ```
/// use histlake_common::Scope;
///
/// let a = Scope::new("plant1", "machine1", "pi").unwrap();
/// let b = Scope::new("plant1", "machine1", "pi").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "plant1/machine1/pi");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    plant_name: String,
    machine_no: String,
    data_source: String,
}

impl Scope {
    /// Create a scope; every component must be non-blank.
    pub fn new(
        plant_name: impl Into<String>,
        machine_no: impl Into<String>,
        data_source: impl Into<String>,
    ) -> Result<Self> {
        let scope = Self {
            plant_name: plant_name.into().trim().to_string(),
            machine_no: machine_no.into().trim().to_string(),
            data_source: data_source.into().trim().to_string(),
        };

        for (field, value) in [
            ("plant_name", &scope.plant_name),
            ("machine_no", &scope.machine_no),
            ("data_source", &scope.data_source),
        ] {
            if value.is_empty() {
                return Err(CommonError::InvalidScope(format!("{field} must not be empty")));
            }
        }

        Ok(scope)
    }

    pub fn plant_name(&self) -> &str {
        &self.plant_name
    }

    pub fn machine_no(&self) -> &str {
        &self.machine_no
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.plant_name, self.machine_no, self.data_source)
    }
}

/// Idempotency key of the processing history: a file name within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub file_name: String,
    pub scope: Scope,
}

impl Slot {
    pub fn new(file_name: impl Into<String>, scope: Scope) -> Self {
        Self {
            file_name: file_name.into(),
            scope,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.file_name, self.scope)
    }
}

// ============================================================================
// Header Metadata
// ============================================================================

/// One parameter column discovered in a file header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderField {
    /// Historian tag / parameter identifier
    pub param_id: String,

    /// Human readable description, when the export carries one
    pub description: Option<String>,

    /// Engineering unit, when the export carries one
    pub unit: Option<String>,

    /// Zero-based position among the parameter columns
    pub position: usize,
}

impl HeaderField {
    pub fn new(param_id: impl Into<String>, position: usize) -> Self {
        Self {
            param_id: param_id.into(),
            description: None,
            unit: None,
            position,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

// ============================================================================
// Ledger Records
// ============================================================================

/// A completed ingestion of one file into one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedFileRecord {
    pub slot: Slot,
    pub processed_at: DateTime<Utc>,

    /// Path the file was read from
    pub source_path: Option<PathBuf>,

    /// Archive the file was extracted from
    pub source_archive: Option<PathBuf>,

    /// SHA-256 of the source file
    pub sha256: Option<String>,

    pub row_count: Option<u64>,

    /// Dataset files committed by the writer
    #[serde(default)]
    pub output_paths: Vec<PathBuf>,
}

/// Per-equipment parameter catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamMasterRecord {
    pub scope: Scope,
    pub param_id: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub column_position: usize,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Global parameter-ID dictionary entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterIdRecord {
    pub param_id: String,
    pub name_en: String,
    pub name_ja: Option<String>,
    pub registered_at: DateTime<Utc>,
}
