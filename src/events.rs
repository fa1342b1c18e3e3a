// 📣 Session Events
// Outward calls from the core into whatever drives it (CLI, GUI, tests).
//
// The core never decides user-facing behavior: it reports what happened and
// the collaborator chooses whether to redraw, warn, or end the session.

use crate::error::{IngestError, LedgerError};

/// SessionEvents - callbacks invoked by the ingestor and ledger helpers
///
/// Called from the ingestion thread, hence `Send + Sync`.
pub trait SessionEvents: Send + Sync {
    /// A new reading was applied to the shared state
    fn on_reading_updated(&self, _timestamp: &str, _weight: f64) {}

    /// The device session ended; invoked at most once per ingestor
    fn on_connection_lost(&self, _cause: &IngestError) {}

    /// A transaction could not be saved and was not applied
    fn on_save_error(&self, _cause: &LedgerError) {}
}
