// ⚖️ Shared Reading State
// The latest (timestamp, gross weight) pair reported by the scale.
//
// One producer (the ingestion thread) and any number of readers share a
// single instance. Both fields live behind one mutex so a snapshot can never
// pair the timestamp of one line with the weight of another.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// VALUES
// ============================================================================

/// Reading - a consistent copy of the scale state at one instant
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    /// Date string exactly as the device printed it ("" until the first date line)
    pub timestamp: String,

    /// Gross weight in kg
    pub gross_weight: f64,
}

impl Reading {
    /// True once the device has reported a date
    pub fn has_timestamp(&self) -> bool {
        !self.timestamp.is_empty()
    }
}

/// ParsedLine - what a matched device line says
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// `Date: D/M/Y[, Weight: W]` - the weight may arrive on a later line
    DateAndWeight { date: String, weight: Option<f64> },

    /// A bare number: weight only, the date stays as it was
    WeightOnly(f64),
}

// ============================================================================
// SHARED STATE
// ============================================================================

/// SharedReadingState - cheaply cloneable handle to the single reading slot
#[derive(Debug, Clone, Default)]
pub struct SharedReadingState {
    inner: Arc<Mutex<Reading>>,
}

impl SharedReadingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the weight and, when given, the timestamp.
    /// `None` leaves the stored timestamp untouched.
    pub fn update(&self, timestamp: Option<&str>, weight: f64) {
        let mut reading = self.lock();
        if let Some(ts) = timestamp {
            reading.timestamp = ts.to_string();
        }
        reading.gross_weight = weight;
    }

    /// Apply a parsed device line and return the resulting reading.
    ///
    /// A date line without a weight carries the previous weight forward.
    /// The read of the previous weight and the write happen under the same
    /// lock acquisition, so a concurrent `reset` cannot interleave.
    pub fn apply(&self, line: &ParsedLine) -> Reading {
        let mut reading = self.lock();
        match line {
            ParsedLine::DateAndWeight { date, weight } => {
                reading.timestamp = date.clone();
                if let Some(w) = weight {
                    reading.gross_weight = *w;
                }
            }
            ParsedLine::WeightOnly(w) => {
                reading.gross_weight = *w;
            }
        }
        reading.clone()
    }

    /// Consistent copy of both fields
    pub fn snapshot(&self) -> Reading {
        self.lock().clone()
    }

    /// Back to the initial ("", 0.0) state, used after a transaction is saved
    pub fn reset(&self) {
        *self.lock() = Reading::default();
    }

    fn lock(&self) -> MutexGuard<'_, Reading> {
        // Every writer replaces the pair as a unit, so a poisoned guard still
        // holds a whole reading.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_initial_snapshot_is_empty() {
        let state = SharedReadingState::new();
        let reading = state.snapshot();

        assert_eq!(reading.timestamp, "");
        assert_eq!(reading.gross_weight, 0.0);
        assert!(!reading.has_timestamp());
    }

    #[test]
    fn test_update_without_timestamp_keeps_date() {
        let state = SharedReadingState::new();
        state.update(Some("01/03/2025"), 12.4);
        state.update(None, 9.9);

        let reading = state.snapshot();
        assert_eq!(reading.timestamp, "01/03/2025");
        assert_eq!(reading.gross_weight, 9.9);
    }

    #[test]
    fn test_apply_date_line_carries_weight_forward() {
        let state = SharedReadingState::new();
        state.apply(&ParsedLine::WeightOnly(4.25));

        let reading = state.apply(&ParsedLine::DateAndWeight {
            date: "02/03/2025".to_string(),
            weight: None,
        });

        assert_eq!(reading.timestamp, "02/03/2025");
        assert_eq!(reading.gross_weight, 4.25);
    }

    #[test]
    fn test_reset_clears_both_fields() {
        let state = SharedReadingState::new();
        state.update(Some("01/03/2025"), 3.0);
        state.reset();

        assert_eq!(state.snapshot(), Reading::default());
    }

    #[test]
    fn test_snapshots_are_never_torn() {
        // Writer keeps timestamp and weight in lockstep; any snapshot that
        // mixes two updates would break the pairing.
        let state = SharedReadingState::new();
        let writer_state = state.clone();

        let writer = thread::spawn(move || {
            for i in 0..2_000u32 {
                writer_state.update(Some(&i.to_string()), f64::from(i));
            }
        });

        for _ in 0..2_000 {
            let reading = state.snapshot();
            if reading.has_timestamp() {
                let ts: f64 = reading.timestamp.parse().unwrap();
                assert_eq!(ts, reading.gross_weight);
            }
        }

        writer.join().unwrap();
    }
}
