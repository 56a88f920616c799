//! Carrier Detector
//!
//! Estimates the dominant residual carrier of a window, in radians/sample.
//!
//! Two strategies are available:
//! - **Phase difference** (default): DC notch → one-pole averaging →
//!   accumulate `arg(y[i]·conj(y[i-1]))`. The mean rotation per sample is
//!   the carrier. No FFT involved.
//! - **Spectral**: exponentially averaged Hann-windowed power spectra of
//!   `resolution` points; the strongest bin outside the DC notch wins.
//!
//! An empty window estimates a carrier of zero.

use crate::domain::{
    AnalysisProfile, CarrierEstimate, ComplexSample, DetectorMethod, SampleWindow, SigscopeError,
    SigscopeResult,
};
use crate::dsp::filter::{DcNotch, OnePoleLowpass};
use crate::dsp::{FftProcessor, KahanSum};

use super::{fraction, CancellableTask, Step, TaskContext, TaskOutput};

const DEFAULT_CHUNK: usize = 65536;

/// Phase-difference accumulator state
struct PhaseState {
    notch: DcNotch,
    lowpass: OnePoleLowpass,
    prev: Option<ComplexSample>,
    accum: KahanSum<f64>,
    count: u64,
}

/// Spectral averaging state
struct SpectralState {
    fft: FftProcessor,
    spectrum: Vec<f32>,
    frames: usize,
}

enum DetectorState {
    Phase(PhaseState),
    Spectral(SpectralState),
}

/// Cancellable carrier estimation over a sample window
pub struct CarrierDetector {
    window: SampleWindow,
    method: DetectorMethod,
    averaging: f64,
    dc_notch: f64,
    resolution: usize,
    chunk_size: usize,
    position: usize,
    state: Option<DetectorState>,
}

impl CarrierDetector {
    /// Phase-difference detector.
    ///
    /// - `averaging`: averaging bandwidth as a fraction of the sample rate, in (0, 1]
    /// - `dc_notch`: DC notch bandwidth as a fraction of the sample rate, in (0, 1]
    pub fn new(window: SampleWindow, averaging: f64, dc_notch: f64) -> Self {
        Self {
            window,
            method: DetectorMethod::PhaseDifference,
            averaging,
            dc_notch,
            resolution: 1024,
            chunk_size: DEFAULT_CHUNK,
            position: 0,
            state: None,
        }
    }

    /// Spectral detector using FFTs of `resolution` points
    pub fn spectral(window: SampleWindow, resolution: usize, averaging: f64, dc_notch: f64) -> Self {
        Self {
            method: DetectorMethod::Spectral,
            resolution,
            ..Self::new(window, averaging, dc_notch)
        }
    }

    /// Detector configured from a saved profile
    pub fn from_profile(window: SampleWindow, profile: &AnalysisProfile) -> Self {
        Self {
            method: profile.detector_method,
            resolution: profile.resolution,
            chunk_size: profile.chunk_size.max(1),
            ..Self::new(window, profile.averaging, profile.dc_notch)
        }
    }

    /// Samples processed between cancellation checks
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn validate(&self) -> SigscopeResult<()> {
        let in_range = |v: f64| v > 0.0 && v <= 1.0;
        if !in_range(self.averaging) {
            return Err(SigscopeError::Config(format!(
                "averaging bandwidth {} outside (0, 1]",
                self.averaging
            )));
        }
        if !in_range(self.dc_notch) {
            return Err(SigscopeError::Config(format!(
                "DC notch bandwidth {} outside (0, 1]",
                self.dc_notch
            )));
        }
        if self.method == DetectorMethod::Spectral
            && (self.resolution < 8 || !self.resolution.is_power_of_two())
        {
            return Err(SigscopeError::Config(format!(
                "spectral resolution {} must be a power of two >= 8",
                self.resolution
            )));
        }
        Ok(())
    }

    fn init_state(&self) -> DetectorState {
        match self.method {
            DetectorMethod::PhaseDifference => DetectorState::Phase(PhaseState {
                notch: DcNotch::new(self.dc_notch),
                lowpass: OnePoleLowpass::new(self.averaging),
                prev: None,
                accum: KahanSum::new(),
                count: 0,
            }),
            DetectorMethod::Spectral => DetectorState::Spectral(SpectralState {
                fft: FftProcessor::new(self.resolution),
                spectrum: vec![0.0; self.resolution],
                frames: 0,
            }),
        }
    }

    fn estimate(&self) -> CarrierEstimate {
        let omega = match &self.state {
            Some(DetectorState::Phase(state)) if state.count > 0 => {
                state.accum.sum() / state.count as f64
            }
            Some(DetectorState::Spectral(state)) if state.frames > 0 => {
                spectral_peak(&state.fft, &state.spectrum, self.dc_notch)
            }
            _ => 0.0,
        };
        CarrierEstimate { omega }
    }
}

impl CancellableTask for CarrierDetector {
    fn work(&mut self, ctx: &TaskContext<'_>) -> Step {
        if self.state.is_none() {
            if let Err(err) = self.validate() {
                return Step::Failed(err);
            }
            self.state = Some(self.init_state());
        }

        if ctx.is_cancelled() {
            return Step::Cancelled;
        }

        let data = self.window.as_slice();
        if self.position >= data.len() {
            return Step::Done(TaskOutput::Carrier(self.estimate()));
        }

        match self.state.as_mut() {
            Some(DetectorState::Phase(state)) => {
                let end = (self.position + self.chunk_size).min(data.len());
                for &x in &data[self.position..end] {
                    let y = state.lowpass.process(state.notch.process(x));
                    if let Some(prev) = state.prev {
                        state.accum.add((y * prev.conj()).arg() as f64);
                        state.count += 1;
                    }
                    state.prev = Some(y);
                }
                self.position = end;
            }
            Some(DetectorState::Spectral(state)) => {
                let n = self.resolution;
                // Whole frames per chunk keep the average independent of the chunk size
                let frames_per_chunk = self.chunk_size.div_ceil(n).max(1);
                for _ in 0..frames_per_chunk {
                    if self.position >= data.len() {
                        break;
                    }
                    let end = (self.position + n).min(data.len());
                    let alpha = if state.frames == 0 { 1.0 } else { self.averaging as f32 };
                    state
                        .fft
                        .average_into(&data[self.position..end], alpha, &mut state.spectrum);
                    state.frames += 1;
                    self.position = end;
                }
            }
            None => return Step::Failed(SigscopeError::Task("detector not initialized".into())),
        }

        if self.position >= data.len() {
            let estimate = self.estimate();
            log::debug!("Carrier estimate: {:.6} rad/sample", estimate.omega);
            Step::Done(TaskOutput::Carrier(estimate))
        } else {
            Step::Continue
        }
    }

    fn progress(&self) -> f32 {
        fraction(self.position, self.window.len())
    }

    fn status(&self) -> String {
        "Guessing carrier...".into()
    }
}

/// Angular frequency of the strongest bin outside the DC notch, refined by
/// parabolic interpolation over its neighbours
fn spectral_peak(fft: &FftProcessor, spectrum: &[f32], dc_notch: f64) -> f64 {
    let n = spectrum.len();
    let half = (n / 2) as f64;
    let notch_bins = dc_notch / 2.0 * n as f64;

    let peak = spectrum
        .iter()
        .enumerate()
        .filter(|(i, _)| (*i as f64 - half).abs() >= notch_bins)
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i);

    let Some(peak) = peak else {
        return 0.0;
    };

    let mut offset = 0.0;
    if peak > 0 && peak + 1 < n {
        let (a, b, c) = (
            spectrum[peak - 1] as f64,
            spectrum[peak] as f64,
            spectrum[peak + 1] as f64,
        );
        let denom = a - 2.0 * b + c;
        if denom.abs() > f64::EPSILON {
            offset = (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
        }
    }

    fft.bin_omega(peak) + offset * 2.0 * std::f64::consts::PI / n as f64
}

/// Mean phase rotation per sample around a cursor, in radians/sample.
///
/// Walks at most `max_iters` sample pairs starting at `start`, striding
/// evenly across `len` samples when the span is longer. Returns `None`
/// when no valid pair falls inside the capture.
pub fn instantaneous_frequency(
    data: &[ComplexSample],
    start: i64,
    len: i64,
    max_iters: usize,
) -> Option<f64> {
    if len <= 0 || max_iters == 0 {
        return None;
    }

    let max_iters = max_iters as i64;
    let (stride, iters) = if len > max_iters {
        (len / max_iters, max_iters)
    } else {
        (1, len)
    };

    let mut accum = KahanSum::<f64>::new();
    let mut count = 0u64;
    for k in 0..iters {
        let i = start + k * stride;
        if i >= 1 && (i as usize) < data.len() {
            let i = i as usize;
            accum.add((data[i] * data[i - 1].conj()).arg() as f64);
            count += 1;
        }
    }

    (count > 0).then(|| accum.sum() / count as f64)
}
