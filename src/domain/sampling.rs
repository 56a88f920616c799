//! Wave sampler configuration
//!
//! `SamplingProperties` mirrors what the operator sets up before sampling a
//! waveform: the window, the sampling space and where the symbol clock comes
//! from. `resolve()` turns that into a concrete rate and symbol count.

use super::error::{SigscopeError, SigscopeResult};
use super::types::{ClockSync, PeriodicSelection, SampleWindow, SamplingSpace};

/// Converts the raw loop gain shown to the operator into the gain used by
/// the timing loop
pub trait GainCalibration {
    fn loop_gain(&self, raw: f32) -> f32;
}

impl<F: Fn(f32) -> f32> GainCalibration for F {
    fn loop_gain(&self, raw: f32) -> f32 {
        self(raw)
    }
}

/// Raw gain expressed in dB, converted to a linear magnitude
#[derive(Debug, Clone, Copy, Default)]
pub struct DecibelGain;

impl GainCalibration for DecibelGain {
    fn loop_gain(&self, raw: f32) -> f32 {
        10f32.powf(raw / 20.0)
    }
}

/// Everything the wave sampler needs to run
#[derive(Debug, Clone)]
pub struct SamplingProperties {
    pub sample_rate: f64,
    pub window: SampleWindow,
    pub space: SamplingSpace,
    pub sync: ClockSync,
    /// Symbol rate in Hz (manual rate, or nominal rate for Gardner)
    pub symbol_rate: f64,
    /// Target symbol count (partition mode)
    pub symbol_count: u64,
    /// Gardner loop gain, already calibrated
    pub loop_gain: f32,
    /// Periodic selection used in selection mode
    pub selection: Option<PeriodicSelection>,
}

/// Clock parameters after applying the sync strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedClock {
    /// Symbol rate in Hz
    pub rate: f64,
    /// Symbols to produce (an upper bound in Gardner mode)
    pub count: u64,
    /// Samples per symbol
    pub samples_per_symbol: f64,
}

impl SamplingProperties {
    pub fn new(sample_rate: f64, window: SampleWindow) -> Self {
        Self {
            sample_rate,
            window,
            space: SamplingSpace::Phase,
            sync: ClockSync::Manual,
            symbol_rate: 0.0,
            symbol_count: 0,
            loop_gain: DecibelGain.loop_gain(-20.0),
            selection: None,
        }
    }

    /// Set the loop gain from a raw operator value
    pub fn with_raw_loop_gain(mut self, raw: f32, calibration: &dyn GainCalibration) -> Self {
        self.loop_gain = calibration.loop_gain(raw);
        self
    }

    /// Derive rate and symbol count from the selected sync strategy
    pub fn resolve(&self) -> SigscopeResult<ResolvedClock> {
        if !(self.sample_rate > 0.0) {
            return Err(SigscopeError::Sampling(format!(
                "invalid sample rate {}",
                self.sample_rate
            )));
        }

        let duration = self.window.duration(self.sample_rate);
        let (rate, count) = match self.sync {
            ClockSync::Manual | ClockSync::Gardner => {
                let count = (duration * self.symbol_rate).floor().max(0.0) as u64;
                (self.symbol_rate, count)
            }
            ClockSync::Partition => {
                let rate = if duration > 0.0 {
                    self.symbol_count as f64 / duration
                } else {
                    0.0
                };
                (rate, self.symbol_count)
            }
            ClockSync::Selection => self.resolve_selection()?,
        };

        if !(rate > 0.0) || !rate.is_finite() {
            return Err(SigscopeError::Sampling(format!("invalid symbol rate {rate}")));
        }
        if count == 0 {
            return Err(SigscopeError::Sampling(
                "window is too short for a single symbol".into(),
            ));
        }

        let samples_per_symbol = self.sample_rate / rate;
        if self.sync == ClockSync::Gardner && samples_per_symbol < 2.0 {
            return Err(SigscopeError::Sampling(format!(
                "Gardner recovery needs at least 2 samples per symbol, got {samples_per_symbol:.3}"
            )));
        }

        Ok(ResolvedClock {
            rate,
            count,
            samples_per_symbol,
        })
    }

    fn resolve_selection(&self) -> SigscopeResult<(f64, u64)> {
        let selection = self
            .selection
            .ok_or_else(|| SigscopeError::Sampling("no periodic selection".into()))?;
        let (start, end) = selection.clamped(self.window.capture_len());
        let sel_len = (end - start) as f64;
        if sel_len <= 0.0 {
            return Err(SigscopeError::Sampling("empty selection".into()));
        }

        let divisions = selection.divisions.max(1) as f64;
        let period = sel_len / divisions;
        let rate = self.sample_rate / period;

        // A selection spanning the whole window is the symbol train itself;
        // a sub-window selection only measures the period.
        let full = start <= self.window.start() && end >= self.window.end();
        let count = if full {
            selection.divisions.max(1) as u64
        } else {
            (self.window.len() as f64 / period).floor() as u64
        };

        Ok((rate, count))
    }
}
