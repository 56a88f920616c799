//! Capture port

use crate::domain::{ComplexSample, Frequency, SigscopeResult};

/// A recorded I/Q capture
pub trait CaptureSource {
    /// Sample rate in Hz
    fn sample_rate(&self) -> f64;

    /// RF frequency the capture is centred on
    fn center_frequency(&self) -> Frequency;

    /// Read the whole capture
    fn read_samples(&mut self) -> SigscopeResult<Vec<ComplexSample>>;
}
