// 🔌 Device Sources
// Line-oriented sources the ingestor polls.
//
// The ingestion loop only needs one capability: "give me the next complete
// line if there is one, without blocking for long". Real scales speak over a
// serial port; captured logs and tests use any buffered reader.

use log::warn;
use std::io::{self, BufRead};

// ============================================================================
// CORE TRAIT
// ============================================================================

/// DeviceSource - polled by the ingestion thread
///
/// * `Ok(Some(line))` - one line, newline stripped (may still be blank)
/// * `Ok(None)` - nothing complete yet, poll again later
/// * `Err(_)` - the source is gone; the session is over
pub trait DeviceSource: Send {
    fn poll_line(&mut self) -> io::Result<Option<String>>;
}

/// Decode one raw line. Invalid UTF-8 is device noise, not a failure.
fn decode_line(raw: &[u8]) -> Option<String> {
    match std::str::from_utf8(raw) {
        Ok(text) => Some(text.trim_end_matches(['\r', '\n']).to_string()),
        Err(err) => {
            warn!("discarding non UTF-8 device line ({} bytes): {}", raw.len(), err);
            None
        }
    }
}

/// Longest partial line kept while waiting for its newline
pub const MAX_PENDING_BYTES: usize = 4096;

/// LineBuffer - reassembles lines from raw chunks
///
/// Bytes without a newline are held back until the rest of the line
/// arrives, up to `MAX_PENDING_BYTES`.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        LineBuffer::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Pop the first complete line. Undecodable lines are dropped and the
    /// next one is tried. A partial line past the limit is discarded.
    pub fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = decode_line(&raw) {
                return Some(line);
            }
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            warn!(
                "discarding {} device bytes with no line break",
                self.pending.len()
            );
            self.pending.clear();
        }
        None
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ============================================================================
// BUFFERED READER SOURCE
// ============================================================================

/// ReaderSource - any `BufRead` that never blocks (replay file, in-memory buffer)
///
/// Each poll reads up to the next newline, so the reader must always have
/// data or end of input at hand. Stopping the ingestor waits for the poll in
/// progress; a reader that blocks (stdin, a pipe) would keep it waiting.
///
/// End of input means the device went away and is reported as an
/// `UnexpectedEof` error.
pub struct ReaderSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead + Send> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        ReaderSource {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead + Send> DeviceSource for ReaderSource<R> {
    fn poll_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device stream closed",
            ));
        }
        Ok(decode_line(&self.buf))
    }
}

// ============================================================================
// SERIAL SOURCE
// ============================================================================

#[cfg(feature = "serial")]
pub use serial::{list_ports, SerialSource};

#[cfg(feature = "serial")]
mod serial {
    use super::{DeviceSource, LineBuffer};
    use log::info;
    use serialport::SerialPort;
    use std::io::{self, Read};
    use std::time::Duration;

    /// SerialSource - a scale attached to a serial port
    ///
    /// Only reads what the driver already buffered, so a poll never waits
    /// longer than the port's read timeout.
    pub struct SerialSource {
        port: Box<dyn SerialPort>,
        lines: LineBuffer,
    }

    impl SerialSource {
        pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> io::Result<Self> {
            let port = serialport::new(path, baud_rate)
                .timeout(read_timeout)
                .open()
                .map_err(io::Error::from)?;
            info!("opened serial port {} at {} baud", path, baud_rate);

            Ok(SerialSource {
                port,
                lines: LineBuffer::new(),
            })
        }
    }

    impl DeviceSource for SerialSource {
        fn poll_line(&mut self) -> io::Result<Option<String>> {
            if let Some(line) = self.lines.take_line() {
                return Ok(Some(line));
            }

            let available = self.port.bytes_to_read().map_err(io::Error::from)?;
            if available == 0 {
                return Ok(None);
            }

            let mut chunk = vec![0u8; available as usize];
            let read = match self.port.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::TimedOut => 0,
                Err(err) => return Err(err),
            };
            self.lines.extend(&chunk[..read]);

            Ok(self.lines.take_line())
        }
    }

    /// Names of the serial ports present on this machine
    pub fn list_ports() -> io::Result<Vec<String>> {
        let ports = serialport::available_ports().map_err(io::Error::from)?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
