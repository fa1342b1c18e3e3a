// Scale Ledger - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod reading;        // Shared reading state (producer/consumer slot)
pub mod device;         // Line sources: serial port, buffered readers
pub mod events;         // Outward callbacks to the collaborator
pub mod ingest;         // Stream ingestor + device line parser
pub mod directory;      // Party directory (CSV)
pub mod ledger;         // Ledger aggregation engine (SQLite)
pub mod catalog;        // Materials, packaging tares, transaction drafts
pub mod config;

// Re-export commonly used types
pub use error::{ConfigError, DirectoryError, DraftError, IngestError, LedgerError};
pub use reading::{ParsedLine, Reading, SharedReadingState};
pub use device::{DeviceSource, ReaderSource};
#[cfg(feature = "serial")]
pub use device::{list_ports, SerialSource};
pub use events::SessionEvents;
pub use ingest::{parse_line, IngestTiming, StreamIngestor};
pub use directory::{PartyDirectory, PartyRecord, UNKNOWN_ID};
pub use ledger::{
    partition_name, record_and_notify,
    Cell, LedgerPartition, LedgerWriter, RecordOutcome, Transaction,
    FALLBACK_PARTITION,
};
pub use catalog::{materials_for, packaging_tare, TransactionDraft};
pub use config::Settings;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
