// End-to-end: device lines → shared state → draft → ledger store

use scale_ledger::{
    Cell, DeviceSource, IngestError, IngestTiming, LedgerWriter, PartyDirectory, ReaderSource,
    SessionEvents, SharedReadingState, StreamIngestor, Transaction, TransactionDraft,
};
use std::io::{self, Cursor};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct LostSignal(Mutex<Sender<()>>);

impl SessionEvents for LostSignal {
    fn on_connection_lost(&self, _cause: &IngestError) {
        let _ = self.0.lock().unwrap().send(());
    }
}

/// Replay `text` through a real ingestor and return the final state
fn ingest(text: &'static str) -> SharedReadingState {
    let state = SharedReadingState::new();
    let (tx, rx) = mpsc::channel();
    let events = Arc::new(LostSignal(Mutex::new(tx)));
    let timing = IngestTiming {
        settle: Duration::ZERO,
        poll_interval: Duration::from_millis(5),
    };
    let open = move || -> io::Result<Box<dyn DeviceSource>> {
        Ok(Box::new(ReaderSource::new(Cursor::new(text.as_bytes().to_vec()))))
    };

    let mut ingestor = StreamIngestor::start(open, state.clone(), events, timing).unwrap();
    rx.recv_timeout(Duration::from_secs(5))
        .expect("replay should end with a lost connection");
    ingestor.stop();

    state
}

fn acme_pet(net: f64) -> Transaction {
    Transaction {
        period: "01/03/2025".to_string(),
        party_name: "ACME".to_string(),
        party_id: "900".to_string(),
        category: "Plastics".to_string(),
        material_name: "PET".to_string(),
        packaging_tare: 0.0,
        gross_weight: net,
        net_weight: net,
    }
}

#[test]
fn test_weight_only_line_keeps_date() {
    let state = ingest("Date: 01/03/2025, Weight: 12.40\n9.90\n");

    let reading = state.snapshot();
    assert_eq!(reading.timestamp, "01/03/2025");
    assert_eq!(reading.gross_weight, 9.90);
}

#[test]
fn test_same_transaction_twice_aggregates_into_one_row() {
    let dir = TempDir::new().unwrap();
    let writer = LedgerWriter::new(dir.path().join("Recycling_Logs.db"));

    writer.record(&acme_pet(7.9)).unwrap();
    writer.record(&acme_pet(7.9)).unwrap();

    let partition = writer.load_partition("March-2025").unwrap().unwrap();
    assert_eq!(partition.columns(), &["DATE", "NAME", "ID", "PET", "TOTAL"]);
    assert_eq!(partition.rows().len(), 1);

    let row = partition.find_row("01/03/2025", "ACME").unwrap();
    assert_eq!(row[0], Cell::Text("01/03/2025".to_string()));
    assert_eq!(row[1], Cell::Text("ACME".to_string()));
    assert!((row[3].as_number() - 15.8).abs() < 1e-9);
    assert!((row[4].as_number() - 15.8).abs() < 1e-9);
}

#[test]
fn test_scale_session_to_ledger() {
    let dir = TempDir::new().unwrap();
    let directory_path = dir.path().join("Collectors_Database.csv");
    std::fs::write(&directory_path, "name,id\nAcme,900\n").unwrap();
    let directory = PartyDirectory::load(&directory_path).unwrap();
    let writer = LedgerWriter::new(dir.path().join("Recycling_Logs.db"));

    let state = ingest("scale ready\nDate: 01/03/2025, Weight: 12.40\n9.90\n");
    let draft = TransactionDraft {
        party_name: "Acme".to_string(),
        category: "Plastics".to_string(),
        material: "PET".to_string(),
        packaging: "Burlap Bag".to_string(),
    };

    let first = draft.finalize(&state.snapshot(), &directory).unwrap();
    let second = draft.finalize(&state.snapshot(), &directory).unwrap();
    writer.record(&first).unwrap();
    let outcome = writer.record(&second).unwrap();

    assert_eq!(outcome.partition, "March-2025");
    assert!(!outcome.row_created);

    let partition = writer.load_partition("March-2025").unwrap().unwrap();
    let pet = partition.amount("01/03/2025", "ACME", "PET").unwrap();
    let total = partition.amount("01/03/2025", "ACME", "TOTAL").unwrap();
    assert!((pet - 16.8).abs() < 1e-9, "2 x (9.90 - 1.5) = 16.8, got {}", pet);
    assert_eq!(pet, total);
    assert_eq!(
        partition.find_row("01/03/2025", "ACME").unwrap()[2],
        Cell::Text("900".to_string())
    );
    assert_eq!(writer.journal_len().unwrap(), 2);
}

#[test]
fn test_two_new_materials_keep_insertion_order() {
    let dir = TempDir::new().unwrap();
    let writer = LedgerWriter::new(dir.path().join("Recycling_Logs.db"));

    let mut copper = acme_pet(2.0);
    copper.material_name = "COPPER".to_string();
    let mut kraft = acme_pet(3.0);
    kraft.material_name = "KRAFT".to_string();
    kraft.party_name = "BETA".to_string();

    writer.record(&copper).unwrap();
    writer.record(&kraft).unwrap();

    let partition = writer.load_partition("March-2025").unwrap().unwrap();
    assert_eq!(
        partition.columns(),
        &["DATE", "NAME", "ID", "COPPER", "KRAFT", "TOTAL"]
    );
    assert_eq!(partition.amount("01/03/2025", "ACME", "TOTAL"), Some(2.0));
    assert_eq!(partition.amount("01/03/2025", "BETA", "TOTAL"), Some(3.0));
}
