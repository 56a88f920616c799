//! Display sink that records what it is shown
//!
//! Used by the CLI to collect results and by tests to observe the session.
//! Clones share the same record, so one clone can be handed to the session
//! while another is inspected.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{DopplerResult, Frequency, Symbol};
use crate::ports::DisplaySink;

/// Everything a `RecordingSink` has received
#[derive(Debug, Default)]
pub struct Recorded {
    /// Symbols currently shown
    pub symbols: Vec<Symbol>,
    /// How many times the symbols were cleared
    pub clears: usize,
    pub carrier: Option<Frequency>,
    pub doppler: Option<DopplerResult>,
    /// Length of the display data after each change
    pub data_changes: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the record for inspection
    pub fn recorded(&self) -> MutexGuard<'_, Recorded> {
        // A panic while holding the lock leaves the record intact
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DisplaySink for RecordingSink {
    fn clear_symbols(&mut self) {
        let mut rec = self.recorded();
        rec.symbols.clear();
        rec.clears += 1;
    }

    fn feed_symbols(&mut self, symbols: &[Symbol]) {
        self.recorded().symbols.extend_from_slice(symbols);
    }

    fn show_carrier(&mut self, frequency: Frequency) {
        self.recorded().carrier = Some(frequency);
    }

    fn accept_doppler(&mut self, result: DopplerResult) {
        self.recorded().doppler = Some(result);
    }

    fn display_data_changed(&mut self, len: usize) {
        self.recorded().data_changes.push(len);
    }
}
