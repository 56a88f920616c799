//! Display port
//!
//! Receives what the analysis session publishes. Every method has a no-op
//! default so a sink only implements what it shows.

use crate::domain::{DopplerResult, Frequency, Symbol};

pub trait DisplaySink: Send {
    /// Drop all symbols currently shown
    fn clear_symbols(&mut self) {}

    /// Append symbols to the constellation and histogram
    fn feed_symbols(&mut self, _symbols: &[Symbol]) {}

    /// Carrier frequency found by the detector
    fn show_carrier(&mut self, _frequency: Frequency) {}

    /// Doppler spectrum and velocity estimate
    fn accept_doppler(&mut self, _result: DopplerResult) {}

    /// The data under analysis changed (new capture, translation, reset)
    fn display_data_changed(&mut self, _len: usize) {}
}
