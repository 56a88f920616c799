//! Doppler Calculator
//!
//! Welch-averaged power spectrum of a window, followed by peak search,
//! spread estimation and conversion to radial velocity:
//!
//! ```text
//! v = -c · (f_observed - f_reference) / f_reference
//! ```
//!
//! `f_observed` is the capture centre plus the offset of the dominant
//! spectral feature. A positive shift (approaching source) reports a
//! negative velocity.

use crate::domain::{DopplerResult, SampleWindow, SigscopeError, SPEED_OF_LIGHT};
use crate::dsp::FftProcessor;

use super::{fraction, CancellableTask, Step, TaskContext, TaskOutput};

/// Bins below `max_power · DOPPLER_FLOOR` end the dominant feature
const DOPPLER_FLOOR: f32 = 0.01;

const DEFAULT_MAX_FFT: usize = 65536;

/// Cancellable Doppler estimation over a sample window
pub struct DopplerCalculator {
    window: SampleWindow,
    sample_rate: f64,
    center_freq: f64,
    reference_freq: f64,
    propagation_speed: f64,
    max_fft: usize,
    fft: Option<FftProcessor>,
    accum: Vec<f32>,
    segments: usize,
    position: usize,
}

impl DopplerCalculator {
    /// Calculator for a capture tuned to `reference_freq` (Hz). The capture
    /// centre defaults to the reference; see `with_center_freq`.
    pub fn new(reference_freq: f64, window: SampleWindow, sample_rate: f64) -> Self {
        Self {
            window,
            sample_rate,
            center_freq: reference_freq,
            reference_freq,
            propagation_speed: SPEED_OF_LIGHT,
            max_fft: DEFAULT_MAX_FFT,
            fft: None,
            accum: Vec::new(),
            segments: 0,
            position: 0,
        }
    }

    /// RF frequency the capture is centred on (Hz)
    pub fn with_center_freq(mut self, center_freq: f64) -> Self {
        self.center_freq = center_freq;
        self
    }

    pub fn with_propagation_speed(mut self, speed: f64) -> Self {
        self.propagation_speed = speed;
        self
    }

    /// Upper bound for the FFT size; longer windows are averaged
    pub fn with_max_fft(mut self, max_fft: usize) -> Self {
        self.max_fft = max_fft;
        self
    }

    fn fft_size(&self) -> usize {
        self.window.len().next_power_of_two().min(self.max_fft).max(1)
    }

    fn finish(&mut self) -> DopplerResult {
        let mut spectrum = std::mem::take(&mut self.accum);
        let Some(fft) = self.fft.take() else {
            return DopplerResult::default();
        };
        if self.segments == 0 || spectrum.is_empty() {
            return DopplerResult::default();
        }

        let scale = 1.0 / self.segments as f32;
        spectrum.iter_mut().for_each(|p| *p *= scale);

        let (peak, max_power) = spectrum
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        // Contiguous region around the peak above the floor. The shifted
        // spectrum is circular, so the region may wrap across ±fs/2.
        let n = spectrum.len() as isize;
        let power_at = |offset: isize| spectrum[(peak as isize + offset).rem_euclid(n) as usize];
        let floor = max_power * DOPPLER_FLOOR;
        let (mut lo, mut hi) = (0isize, 0isize);
        while hi - lo + 1 < n && power_at(lo - 1) >= floor {
            lo -= 1;
        }
        while hi - lo + 1 < n && power_at(hi + 1) >= floor {
            hi += 1;
        }

        // Offsets are measured from the peak without wrapping, then the
        // centroid is folded back into [-fs/2, fs/2)
        let resolution = self.sample_rate / fft.fft_size() as f64;
        let peak_freq = fft.bin_frequency(peak, self.sample_rate);
        let mut weight = 0.0f64;
        let mut first = 0.0f64;
        for offset in lo..=hi {
            let p = power_at(offset) as f64;
            weight += p;
            first += p * (peak_freq + offset as f64 * resolution);
        }
        let centroid = if weight > 0.0 { first / weight } else { peak_freq };

        let mut second = 0.0f64;
        for offset in lo..=hi {
            let d = peak_freq + offset as f64 * resolution - centroid;
            second += power_at(offset) as f64 * d * d;
        }
        let sigma = if weight > 0.0 { (second / weight).sqrt() } else { 0.0 };

        let half = self.sample_rate / 2.0;
        let freq = if centroid >= half {
            centroid - self.sample_rate
        } else if centroid < -half {
            centroid + self.sample_rate
        } else {
            centroid
        };

        let (velocity, velocity_sigma) = if self.reference_freq > 0.0 {
            let observed = self.center_freq + freq;
            (
                -self.propagation_speed * (observed - self.reference_freq) / self.reference_freq,
                self.propagation_speed * sigma / self.reference_freq,
            )
        } else {
            log::warn!("Reference frequency is not positive; velocity left at zero");
            (0.0, 0.0)
        };

        DopplerResult {
            spectrum,
            resolution,
            freq,
            sigma,
            max_power,
            velocity,
            velocity_sigma,
        }
    }
}

impl CancellableTask for DopplerCalculator {
    fn work(&mut self, ctx: &TaskContext<'_>) -> Step {
        if self.fft.is_none() {
            if !(self.sample_rate > 0.0) {
                return Step::Failed(SigscopeError::Config(format!(
                    "invalid sample rate {}",
                    self.sample_rate
                )));
            }
            if self.max_fft == 0 {
                return Step::Failed(SigscopeError::Config("FFT size limit is zero".into()));
            }
            if self.window.is_empty() {
                return Step::Done(TaskOutput::Doppler(DopplerResult::default()));
            }
            let n = self.fft_size();
            self.fft = Some(FftProcessor::new(n));
            self.accum = vec![0.0; n];
        }

        if ctx.is_cancelled() {
            return Step::Cancelled;
        }

        let data = self.window.as_slice();
        if let Some(fft) = self.fft.as_mut() {
            let n = fft.fft_size();
            let end = (self.position + n).min(data.len());
            // A short tail only counts when it is all there is
            if end - self.position == n || self.segments == 0 {
                fft.accumulate(&data[self.position..end], 1.0, &mut self.accum);
                self.segments += 1;
            }
            self.position = end;
        }

        if self.position < data.len() {
            return Step::Continue;
        }

        let result = self.finish();
        log::debug!(
            "Doppler peak {:.3} Hz, sigma {:.3} Hz, velocity {:.3} m/s",
            result.freq,
            result.sigma,
            result.velocity
        );
        Step::Done(TaskOutput::Doppler(result))
    }

    fn progress(&self) -> f32 {
        fraction(self.position, self.window.len())
    }

    fn status(&self) -> String {
        "Computing Doppler spectrum...".into()
    }
}
