//! histlake Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the histlake workspace.
//!
//! # Overview
//!
//! - **Types**: equipment scopes, processing slots and ledger records
//! - **Error Handling**: [`CommonError`] and the crate [`Result`] alias
//! - **Checksums**: source file fingerprints recorded as provenance
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use histlake_common::{Result, Scope, Slot};
//! use histlake_common::checksum::sha256_file;
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let scope = Scope::new("plant1", "machine1", "pi")?;
//!     let slot = Slot::new("2023_01.csv", scope);
//!     let digest = sha256_file(path)?;
//!     tracing::info!(%slot, %digest, "fingerprinted");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::{
    HeaderField, ParamMasterRecord, ParameterIdRecord, ProcessedFileRecord, Scope, Slot,
};
