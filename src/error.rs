// ⚠️ Error Taxonomy
// Every failure the core can report, grouped by the flow that produces it.
//
// - Ingestion: malformed lines are never errors (parse_line returns None),
//   only a lost connection is, and it is reported exactly once.
// - Ledger: surfaced synchronously per call; nothing is committed on error,
//   so the same transaction can simply be submitted again.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// INGESTION
// ============================================================================

#[derive(Debug, Error)]
pub enum IngestError {
    /// The device could not be opened, or stopped being readable.
    /// Fatal to the session; the ingestor does not reconnect.
    #[error("connection to device lost: {0}")]
    ConnectionLost(#[source] io::Error),
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open ledger store {path}: {source}")]
    StoreOpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to save partition '{partition}': {source}")]
    SaveFailed {
        partition: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The material name cannot become a column of its own.
    #[error("material '{material}' conflicts with ledger column layout: {reason}")]
    SchemaConflict { material: String, reason: String },
}

// ============================================================================
// PARTY DIRECTORY
// ============================================================================

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to create party directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read party directory {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The file exists and is readable but holds no usable party rows.
    #[error("party directory {path} has no entries")]
    Empty { path: PathBuf },
}

// ============================================================================
// DRAFTS
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum DraftError {
    #[error("no date received from the scale yet")]
    MissingPeriod,

    #[error("{0} must be selected")]
    MissingField(&'static str),

    #[error("material '{material}' does not belong to category '{category}'")]
    MaterialNotInCategory { category: String, material: String },

    #[error("unknown category '{0}'")]
    UnknownCategory(String),
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
