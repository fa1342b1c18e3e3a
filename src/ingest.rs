// 📡 Stream Ingestor
// Turns the scale's text output into readings.
//
// Device line formats:
//   "Date: 12/12/2025, Weight: 10.50"   date + weight
//   "Date: 12/12/2025"                  date only, weight carried forward
//   "10.50"                             weight only, date unchanged
// Everything else is noise and is dropped without touching the state.

use crate::device::DeviceSource;
use crate::error::IngestError;
use crate::events::SessionEvents;
use crate::reading::{ParsedLine, SharedReadingState};
use log::{debug, error, info};
use regex::Regex;
use std::io;
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// ============================================================================
// LINE PARSER
// ============================================================================

fn date_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^Date: ([0-9/]+)(?:, Weight: ([0-9.]+))?").expect("valid date line regex")
    })
}

fn weight_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9.]+$").expect("valid weight line regex"))
}

/// Parse one device line.
///
/// Returns `None` for lines that match neither format. A token that looks
/// numeric but is not a valid float (e.g. "1.2.3") also counts as noise.
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    let line = line.trim();

    if let Some(caps) = date_line_pattern().captures(line) {
        let date = caps[1].to_string();
        let weight = match caps.get(2) {
            Some(token) => Some(token.as_str().parse::<f64>().ok()?),
            None => None,
        };
        return Some(ParsedLine::DateAndWeight { date, weight });
    }

    if weight_line_pattern().is_match(line) {
        return line.parse::<f64>().ok().map(ParsedLine::WeightOnly);
    }

    None
}

// ============================================================================
// INGESTION LOOP
// ============================================================================

/// Timing knobs for a device session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestTiming {
    /// Pause after opening the device so it can finish initializing
    pub settle: Duration,

    /// Wait between polls when no line is available; also the stop latency
    pub poll_interval: Duration,
}

impl Default for IngestTiming {
    fn default() -> Self {
        IngestTiming {
            settle: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }
}

type StopSignal = Arc<(Mutex<bool>, Condvar)>;

/// StreamIngestor - background thread feeding a SharedReadingState
///
/// Stopped explicitly with `stop()` or implicitly on drop.
pub struct StreamIngestor {
    stop_signal: StopSignal,
    handle: Option<JoinHandle<()>>,
}

impl StreamIngestor {
    /// Spawn the ingestion thread.
    ///
    /// `open` runs on the new thread; if it fails the collaborator gets
    /// `on_connection_lost` and the thread ends. Only a failure to spawn the
    /// thread itself is returned here.
    pub fn start<F>(
        open: F,
        state: SharedReadingState,
        events: Arc<dyn SessionEvents>,
        timing: IngestTiming,
    ) -> io::Result<Self>
    where
        F: FnOnce() -> io::Result<Box<dyn DeviceSource>> + Send + 'static,
    {
        let stop_signal: StopSignal = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_signal = Arc::clone(&stop_signal);

        let handle = thread::Builder::new()
            .name("scale-ingest".to_string())
            .spawn(move || run_session(open, &state, events.as_ref(), timing, &thread_signal))?;

        Ok(StreamIngestor {
            stop_signal,
            handle: Some(handle),
        })
    }

    /// True until the loop has exited (stopped or connection lost)
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop and wait for it to exit
    pub fn stop(&mut self) {
        {
            let (lock, cvar) = &*self.stop_signal;
            let mut stopped = lock.lock().unwrap_or_else(|p| p.into_inner());
            *stopped = true;
            cvar.notify_all();
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("ingestion thread panicked");
            }
        }
    }
}

impl Drop for StreamIngestor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Wait up to `timeout` for the stop flag. Returns true if stop was requested.
fn wait_for_stop(signal: &StopSignal, timeout: Duration) -> bool {
    let (lock, cvar) = &**signal;
    let guard = lock.lock().unwrap_or_else(|p| p.into_inner());
    if *guard || timeout.is_zero() {
        return *guard;
    }

    let (guard, _) = cvar
        .wait_timeout_while(guard, timeout, |stopped| !*stopped)
        .unwrap_or_else(|p| p.into_inner());
    *guard
}

fn run_session<F>(
    open: F,
    state: &SharedReadingState,
    events: &dyn SessionEvents,
    timing: IngestTiming,
    stop_signal: &StopSignal,
) where
    F: FnOnce() -> io::Result<Box<dyn DeviceSource>>,
{
    let mut source = match open() {
        Ok(source) => source,
        Err(err) => {
            report_connection_lost(events, err);
            return;
        }
    };

    if wait_for_stop(stop_signal, timing.settle) {
        info!("ingestion stopped before the device settled");
        return;
    }
    info!("device session started");

    loop {
        match source.poll_line() {
            Ok(Some(line)) => {
                handle_line(&line, state, events);
                if wait_for_stop(stop_signal, Duration::ZERO) {
                    break;
                }
            }
            Ok(None) => {
                if wait_for_stop(stop_signal, timing.poll_interval) {
                    break;
                }
            }
            Err(err) => {
                report_connection_lost(events, err);
                return;
            }
        }
    }

    info!("device session stopped");
}

fn handle_line(line: &str, state: &SharedReadingState, events: &dyn SessionEvents) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match parse_line(line) {
        Some(parsed) => {
            let reading = state.apply(&parsed);
            debug!(
                "reading updated: timestamp={:?} weight={}",
                reading.timestamp, reading.gross_weight
            );
            events.on_reading_updated(&reading.timestamp, reading.gross_weight);
        }
        None => debug!("discarding unrecognized device line: {:?}", line),
    }
}

fn report_connection_lost(events: &dyn SessionEvents, cause: io::Error) {
    let err = IngestError::ConnectionLost(cause);
    error!("{}", err);
    events.on_connection_lost(&err);
}

// ============================================================================
// TESTS
// ============================================================================
