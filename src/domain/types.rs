//! Core domain types

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Complex baseband sample (I/Q pair, 32-bit float per component)
pub type ComplexSample = Complex<f32>;

/// Frequency in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frequency(pub f64);

impl Frequency {
    pub fn hz(hz: f64) -> Self {
        Self(hz)
    }

    pub fn khz(khz: f64) -> Self {
        Self(khz * 1_000.0)
    }

    pub fn mhz(mhz: f64) -> Self {
        Self(mhz * 1_000_000.0)
    }

    pub fn as_hz(&self) -> f64 {
        self.0
    }

    /// Convert a normalized angular frequency (radians/sample) to Hz
    pub fn from_angular(omega: f64, sample_rate: f64) -> Self {
        Self(omega * sample_rate / (2.0 * PI))
    }

    /// Normalized angular frequency in radians/sample, wrapped to `[-π, π]`
    pub fn to_angular(&self, sample_rate: f64) -> f64 {
        if sample_rate <= 0.0 {
            return 0.0;
        }
        wrap_angle(2.0 * PI * self.0 / sample_rate)
    }
}

/// Wrap an angle into `[-π, π]`
pub fn wrap_angle(omega: f64) -> f64 {
    if !omega.is_finite() {
        return 0.0;
    }
    if (-PI..=PI).contains(&omega) {
        return omega;
    }
    (omega + PI).rem_euclid(2.0 * PI) - PI
}

/// Read-only view over a shared capture.
///
/// Cloning a window only bumps the reference count of the underlying
/// buffer; samples are never copied. Bounds are clamped on construction,
/// so a window is always safe to slice.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    data: Arc<[ComplexSample]>,
    start: usize,
    end: usize,
}

impl SampleWindow {
    /// Build a window over `data[start..end]`, clamping both bounds to
    /// `[0, len]`. An inverted range yields an empty window.
    pub fn new(data: Arc<[ComplexSample]>, start: i64, end: i64) -> Self {
        let len = data.len() as i64;
        let start = start.clamp(0, len) as usize;
        let end = (end.clamp(0, len) as usize).max(start);
        Self { data, start, end }
    }

    /// Window covering the whole buffer
    pub fn full(data: Arc<[ComplexSample]>) -> Self {
        let end = data.len();
        Self { data, start: 0, end }
    }

    pub fn as_slice(&self) -> &[ComplexSample] {
        &self.data[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Length of the underlying capture, not of the window
    pub fn capture_len(&self) -> usize {
        self.data.len()
    }

    /// Duration of the window in seconds
    pub fn duration(&self, sample_rate: f64) -> f64 {
        if sample_rate > 0.0 {
            self.len() as f64 / sample_rate
        } else {
            0.0
        }
    }

    /// Linearly interpolated sample at a fractional position relative to
    /// the window start. Positions outside the window are clamped.
    pub fn interpolate(&self, pos: f64) -> ComplexSample {
        let slice = self.as_slice();
        match slice.len() {
            0 => ComplexSample::new(0.0, 0.0),
            1 => slice[0],
            len => {
                let pos = pos.clamp(0.0, (len - 1) as f64);
                let i = pos.floor() as usize;
                if i + 1 >= len {
                    return slice[len - 1];
                }
                let t = (pos - i as f64) as f32;
                slice[i] * (1.0 - t) + slice[i + 1] * t
            }
        }
    }
}

/// Horizontal selection, optionally split into periodic divisions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodicSelection {
    pub start: i64,
    pub end: i64,
    /// Number of subdivisions (1 when periodic selection is off)
    pub divisions: u32,
}

impl PeriodicSelection {
    pub fn new(start: i64, end: i64, divisions: u32) -> Self {
        Self {
            start,
            end,
            divisions: divisions.max(1),
        }
    }

    /// Clamp to a capture of `len` samples, returning `(start, end)`
    pub fn clamped(&self, len: usize) -> (usize, usize) {
        let len = len as i64;
        let start = self.start.clamp(0, len);
        let end = self.end.clamp(0, len).max(start);
        (start as usize, end as usize)
    }
}

/// Space in which symbols are sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingSpace {
    Amplitude,
    Phase,
    Frequency,
}

impl SamplingSpace {
    /// Project a sample (and its predecessor, for the frequency space) onto
    /// the real value fed to histograms
    pub fn project(&self, current: ComplexSample, previous: ComplexSample) -> f32 {
        match self {
            SamplingSpace::Amplitude => current.norm(),
            SamplingSpace::Phase => current.arg(),
            SamplingSpace::Frequency => (current * previous.conj()).arg(),
        }
    }
}

/// Source of the symbol clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockSync {
    /// Symbol rate entered by the operator
    Manual,
    /// Closed-loop Gardner timing recovery
    Gardner,
    /// Derived from a periodic selection
    Selection,
    /// Derived from a target symbol count
    Partition,
}

/// Estimated residual carrier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarrierEstimate {
    /// Peak angular frequency in radians/sample
    pub omega: f64,
}

impl CarrierEstimate {
    pub fn frequency(&self, sample_rate: f64) -> Frequency {
        Frequency::from_angular(self.omega, sample_rate)
    }
}

/// Output of the Doppler calculator
#[derive(Debug, Clone, Default)]
pub struct DopplerResult {
    /// Power spectrum, FFT-shifted so bin 0 is -fs/2
    pub spectrum: Vec<f32>,
    /// Width of a spectrum bin in Hz
    pub resolution: f64,
    /// Frequency of the spectral peak relative to the capture centre (Hz)
    pub freq: f64,
    /// Spread of the dominant feature (Hz)
    pub sigma: f64,
    pub max_power: f32,
    /// Radial velocity in m/s (positive when receding)
    pub velocity: f64,
    pub velocity_sigma: f64,
}

/// One recovered symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Symbol {
    /// Interpolated sample at the symbol instant (constellation point)
    pub iq: ComplexSample,
    /// Projection of the sample onto the sampling space (histogram value)
    pub value: f32,
}

/// Incremental block of symbols produced by the sampler
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolBatch {
    /// Index of the first symbol of this batch within the run
    pub first_index: usize,
    pub space: SamplingSpace,
    pub symbols: Vec<Symbol>,
}
