use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use scale_ledger::config::DEFAULT_CONFIG_FILE;
use scale_ledger::{
    record_and_notify, DeviceSource, IngestError, LedgerError, LedgerWriter, PartyDirectory,
    ReaderSource, Reading, SessionEvents, Settings, SharedReadingState, StreamIngestor,
    TransactionDraft,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Parser)]
#[command(name = "scale-ledger", version, about = "Record recycling scale weighings into a monthly ledger")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Ledger store (overrides the config file)
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Party directory CSV (overrides the config file)
    #[arg(long, global = true)]
    directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports
    Ports,
    /// Show live readings until Enter is pressed
    Watch(DeviceArgs),
    /// Weigh on the scale, then record the reading shown when Enter is pressed
    Capture {
        #[command(flatten)]
        device: DeviceArgs,
        #[command(flatten)]
        draft: DraftArgs,
        /// Record zero/negative net weights without asking
        #[arg(long)]
        yes: bool,
    },
    /// Record a weighing typed in by hand
    Record {
        /// Date as the scale prints it (D/M/Y)
        #[arg(long)]
        date: String,
        /// Gross weight in kg
        #[arg(long)]
        gross: f64,
        #[command(flatten)]
        draft: DraftArgs,
        #[arg(long)]
        yes: bool,
    },
    /// List the parties in the directory
    Parties,
}

#[derive(Args)]
struct DeviceArgs {
    /// Serial port of the scale (overrides the config file)
    #[arg(long)]
    port: Option<String>,

    /// Replay a captured device log instead of opening a port
    #[arg(long, conflicts_with = "port")]
    replay: Option<PathBuf>,
}

#[derive(Args)]
struct DraftArgs {
    #[arg(long)]
    party: String,
    #[arg(long)]
    category: String,
    #[arg(long)]
    material: String,
    #[arg(long, default_value = "None")]
    packaging: String,
}

impl From<DraftArgs> for TransactionDraft {
    fn from(args: DraftArgs) -> Self {
        TransactionDraft {
            party_name: args.party,
            category: args.category,
            material: args.material,
            packaging: args.packaging,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut settings = Settings::load(&cli.config)?;
    if let Some(ledger) = cli.ledger {
        settings.storage.ledger_path = ledger;
    }
    if let Some(directory) = cli.directory {
        settings.storage.directory_path = directory;
    }

    match cli.command {
        Command::Ports => run_ports(),
        Command::Watch(device) => run_watch(&settings, device),
        Command::Capture { device, draft, yes } => run_capture(&settings, device, draft.into(), yes),
        Command::Record { date, gross, draft, yes } => {
            let reading = Reading {
                timestamp: date,
                gross_weight: gross,
            };
            let draft: TransactionDraft = draft.into();
            record_reading(&settings, &reading, &draft, yes)
        }
        Command::Parties => run_parties(&settings),
    }
}

// ============================================================================
// COLLABORATOR
// ============================================================================

enum Wake {
    Enter,
    ConnectionLost,
}

/// Prints readings as they arrive and wakes the main thread on loss
struct ConsoleEvents {
    wake: Mutex<Sender<Wake>>,
}

impl SessionEvents for ConsoleEvents {
    fn on_reading_updated(&self, timestamp: &str, weight: f64) {
        print!("\r📟 {:<12} {:>8.2} kg   ", timestamp, weight);
        let _ = io::stdout().flush();
    }

    fn on_connection_lost(&self, cause: &IngestError) {
        eprintln!("\n❌ {}", cause);
        if let Ok(wake) = self.wake.lock() {
            let _ = wake.send(Wake::ConnectionLost);
        }
    }

    fn on_save_error(&self, cause: &LedgerError) {
        eprintln!("❌ Save error: {}", cause);
        eprintln!("   Nothing was recorded; make sure the ledger file is not open elsewhere and retry.");
    }
}

/// Start a device session; returns the ingestor and a channel that yields
/// once Enter is pressed or the device is lost.
fn start_session(
    settings: &Settings,
    device: DeviceArgs,
    state: &SharedReadingState,
) -> Result<(StreamIngestor, Receiver<Wake>, Arc<ConsoleEvents>)> {
    let (tx, rx) = mpsc::channel();
    let events = Arc::new(ConsoleEvents {
        wake: Mutex::new(tx.clone()),
    });

    let ingestor = match device.replay {
        Some(path) => {
            let open = move || -> io::Result<Box<dyn DeviceSource>> {
                let file = File::open(&path)?;
                Ok(Box::new(ReaderSource::new(BufReader::new(file))))
            };
            StreamIngestor::start(open, state.clone(), events.clone(), settings.timing())
        }
        None => {
            let port = device
                .port
                .or_else(|| settings.device.port.clone())
                .ok_or_else(|| anyhow!("no serial port given (use --port or set device.port)"))?;
            let open = serial_opener(port, settings)?;
            StreamIngestor::start(open, state.clone(), events.clone(), settings.timing())
        }
    }
    .context("Failed to start ingestion thread")?;

    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        let _ = tx.send(Wake::Enter);
    });

    Ok((ingestor, rx, events))
}

#[cfg(feature = "serial")]
fn serial_opener(
    port: String,
    settings: &Settings,
) -> Result<impl FnOnce() -> io::Result<Box<dyn DeviceSource>> + Send + 'static> {
    let baud_rate = settings.device.baud_rate;
    let timeout = settings.read_timeout();
    Ok(move || -> io::Result<Box<dyn DeviceSource>> {
        Ok(Box::new(scale_ledger::SerialSource::open(&port, baud_rate, timeout)?))
    })
}

#[cfg(not(feature = "serial"))]
fn serial_opener(
    _port: String,
    _settings: &Settings,
) -> Result<fn() -> io::Result<Box<dyn DeviceSource>>> {
    bail!("serial support not compiled in; rebuild with --features serial or use --replay")
}

// ============================================================================
// COMMANDS
// ============================================================================

#[cfg(feature = "serial")]
fn run_ports() -> Result<()> {
    let ports = scale_ledger::list_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No ports found. Check the device and try again.");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn run_ports() -> Result<()> {
    bail!("serial support not compiled in; rebuild with --features serial")
}

fn run_watch(settings: &Settings, device: DeviceArgs) -> Result<()> {
    let state = SharedReadingState::new();
    let (mut ingestor, wake, _events) = start_session(settings, device, &state)?;

    println!("Waiting for scale data... (press Enter to stop)");
    let _ = wake.recv();
    ingestor.stop();

    let last = state.snapshot();
    println!("\nLast reading: {:?} {:.2} kg", last.timestamp, last.gross_weight);
    Ok(())
}

fn run_capture(settings: &Settings, device: DeviceArgs, draft: TransactionDraft, yes: bool) -> Result<()> {
    let replaying = device.replay.is_some();
    let state = SharedReadingState::new();
    let (mut ingestor, wake, events) = start_session(settings, device, &state)?;

    println!("Place the load on the scale, then press Enter to record.");
    let confirmed = wait_for_confirmation(&wake, replaying);
    ingestor.stop();
    println!();

    if !confirmed {
        bail!("device session ended before a weighing was confirmed");
    }

    let reading = state.snapshot();
    record_with(settings, &reading, &draft, yes, events.as_ref())?;
    state.reset();
    Ok(())
}

/// Block until the weighing is confirmed with Enter.
///
/// A live device that goes away ends the capture. A replay always ends
/// that way, so its last reading stays on screen until Enter is pressed.
fn wait_for_confirmation(wake: &Receiver<Wake>, replaying: bool) -> bool {
    match wake.recv() {
        Ok(Wake::Enter) => true,
        Ok(Wake::ConnectionLost) if replaying => {
            println!("\nReplay finished; press Enter to record the last reading.");
            matches!(wake.recv(), Ok(Wake::Enter))
        }
        _ => false,
    }
}

fn record_reading(settings: &Settings, reading: &Reading, draft: &TransactionDraft, yes: bool) -> Result<()> {
    let (tx, _rx) = mpsc::channel();
    let events = ConsoleEvents { wake: Mutex::new(tx) };
    record_with(settings, reading, draft, yes, &events)
}

fn record_with(
    settings: &Settings,
    reading: &Reading,
    draft: &TransactionDraft,
    yes: bool,
    events: &dyn SessionEvents,
) -> Result<()> {
    let directory = PartyDirectory::load(&settings.storage.directory_path).unwrap_or_else(|err| {
        eprintln!("⚠️  {}; party IDs will be recorded as unknown", err);
        PartyDirectory::default()
    });

    let tx = draft.finalize(reading, &directory).context("Incomplete data")?;

    if tx.needs_confirmation() && !yes && !confirm(&format!(
        "Net weight is {:.2} kg. Register anyway? [y/N] ",
        tx.net_weight
    ))? {
        println!("Not recorded.");
        return Ok(());
    }

    let writer = LedgerWriter::new(&settings.storage.ledger_path);
    let outcome = record_and_notify(&writer, &tx, events)?;
    info!("ledger store: {}", writer.path().display());

    println!(
        "✅ Recorded {:.2} kg of {} for {} in '{}'",
        tx.net_weight, tx.material_name, tx.party_name, outcome.partition
    );
    if !outcome.columns_added.is_empty() {
        println!("   New columns: {}", outcome.columns_added.join(", "));
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn run_parties(settings: &Settings) -> Result<()> {
    let directory = PartyDirectory::load(&settings.storage.directory_path)?;
    println!("📇 {} parties", directory.len());
    for name in directory.names() {
        println!("  {:<30} {}", name, directory.resolve(name));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_end_waits_for_enter() {
        let (tx, rx) = mpsc::channel();
        tx.send(Wake::ConnectionLost).unwrap();
        tx.send(Wake::Enter).unwrap();

        assert!(wait_for_confirmation(&rx, true));
    }

    #[test]
    fn test_live_device_loss_ends_capture() {
        let (tx, rx) = mpsc::channel();
        tx.send(Wake::ConnectionLost).unwrap();
        tx.send(Wake::Enter).unwrap();

        assert!(!wait_for_confirmation(&rx, false));
    }

    #[test]
    fn test_enter_confirms_either_way() {
        for replaying in [false, true] {
            let (tx, rx) = mpsc::channel();
            tx.send(Wake::Enter).unwrap();
            assert!(wait_for_confirmation(&rx, replaying));
        }
    }
}
