//! Error types for histlake ingestion
//!
//! Errors are split by blast radius: most variants only fail the file (or
//! archive) being handled, while [`IngestError::is_catastrophic`] marks the
//! ones that make continuing the batch pointless.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Archive entry tried to escape the extraction sandbox
    #[error("Unsafe archive entry '{entry}': {reason}")]
    PathSafety { entry: String, reason: String },

    /// Archive could not be opened or one of its entries could not be read
    #[error("Failed to read archive '{}': {message}", path.display())]
    ArchiveRead { path: PathBuf, message: String },

    /// Source file does not follow the historian CSV layout
    #[error("Failed to parse '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Columnar output could not be committed
    #[error("Failed to write dataset for '{file_name}': {message}")]
    Write { file_name: String, message: String },

    /// Ledger statement failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    /// Ledger handle is unusable for the rest of the run
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// No equipment scope could be attached to a file
    #[error("Cannot resolve scope for '{}': {message}", path.display())]
    Scope { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] histlake_common::CommonError),
}

impl IngestError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn write(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            file_name: file_name.into(),
            message: message.into(),
        }
    }

    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ArchiveRead {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error invalidates the whole run rather than one file
    pub fn is_catastrophic(&self) -> bool {
        matches!(self, Self::LedgerUnavailable(_) | Self::Config(_))
    }
}
