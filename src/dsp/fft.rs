//! FFT processing for spectral estimates

use std::sync::Arc;
use rustfft::{Fft, FftPlanner, num_complex::Complex};

use crate::domain::ComplexSample;

/// FFT processor for computing windowed power spectra of complex samples
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl FftProcessor {
    /// Create a new FFT processor with the given size
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(1);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Generate Hanning window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let x = std::f32::consts::PI * i as f32 / fft_size as f32;
                0.5 * (1.0 - (2.0 * x).cos())
            })
            .collect();

        Self {
            fft,
            fft_size,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    /// Compute the windowed power spectrum (|X|², linear) of up to
    /// `fft_size` samples, zero-padding short input.
    ///
    /// The result is FFT-shifted: bin 0 is -fs/2 and bin `fft_size / 2` is DC.
    pub fn power_spectrum(&mut self, samples: &[ComplexSample]) -> Vec<f32> {
        let mut out = vec![0.0; self.fft_size];
        self.accumulate(samples, 1.0, &mut out);
        out
    }

    /// Add `weight · |X|²` of the given samples into `acc` (FFT-shifted).
    /// `acc` must hold `fft_size` bins.
    pub fn accumulate(&mut self, samples: &[ComplexSample], weight: f32, acc: &mut [f32]) {
        self.transform(samples);

        let n = self.fft_size;
        let half = n / 2;
        for (i, bin) in acc.iter_mut().enumerate().take(n) {
            *bin += weight * self.buffer[(i + half) % n].norm_sqr();
        }
    }

    /// Blend the spectrum of `samples` into `avg` with an exponential
    /// average: `avg += alpha · (|X|² - avg)`
    pub fn average_into(&mut self, samples: &[ComplexSample], alpha: f32, avg: &mut [f32]) {
        self.transform(samples);

        let n = self.fft_size;
        let half = n / 2;
        for (i, bin) in avg.iter_mut().enumerate().take(n) {
            let power = self.buffer[(i + half) % n].norm_sqr();
            *bin += alpha * (power - *bin);
        }
    }

    fn transform(&mut self, samples: &[ComplexSample]) {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            *slot = match samples.get(i) {
                Some(&s) => s * self.window[i],
                None => Complex::new(0.0, 0.0),
            };
        }

        self.fft.process(&mut self.buffer);
    }

    /// Frequency (Hz) of an FFT-shifted bin
    pub fn bin_frequency(&self, bin: usize, sample_rate: f64) -> f64 {
        (bin as f64 - (self.fft_size / 2) as f64) * sample_rate / self.fft_size as f64
    }

    /// Angular frequency (radians/sample) of an FFT-shifted bin
    pub fn bin_omega(&self, bin: usize) -> f64 {
        2.0 * std::f64::consts::PI * (bin as f64 - (self.fft_size / 2) as f64)
            / self.fft_size as f64
    }

    /// Get the FFT size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, sample_rate: f64, len: usize) -> Vec<ComplexSample> {
        (0..len)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate;
                ComplexSample::new(phase.cos() as f32, phase.sin() as f32)
            })
            .collect()
    }

    fn peak_bin(spectrum: &[f32]) -> usize {
        spectrum
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_fft_pure_tone() {
        let mut processor = FftProcessor::new(1024);
        let sample_rate = 48000.0;

        let spectrum = processor.power_spectrum(&tone(1000.0, sample_rate, 1024));
        let peak = peak_bin(&spectrum);

        // bin = 512 + freq * fft_size / sample_rate ≈ 512 + 21.3
        let freq = processor.bin_frequency(peak, sample_rate);
        assert!(
            (freq - 1000.0).abs() <= sample_rate / 1024.0,
            "Peak at {freq} Hz, expected near 1000 Hz"
        );
    }

    #[test]
    fn negative_frequencies_land_below_dc() {
        let mut processor = FftProcessor::new(256);
        let spectrum = processor.power_spectrum(&tone(-3000.0, 48000.0, 256));
        let peak = peak_bin(&spectrum);
        assert!(peak < 128);
        assert!((processor.bin_frequency(peak, 48000.0) + 3000.0).abs() <= 48000.0 / 256.0);
    }

    #[test]
    fn compute_repeated_calls_give_identical_results() {
        let mut processor = FftProcessor::new(1024);
        let samples = tone(1000.0, 48000.0, 1024);

        let first = processor.power_spectrum(&samples);
        let second = processor.power_spectrum(&samples);

        assert_eq!(
            first, second,
            "repeated power_spectrum() calls must return identical results"
        );
    }

    #[test]
    fn exponential_average_converges_to_spectrum() {
        let mut processor = FftProcessor::new(64);
        let samples = tone(500.0, 8000.0, 64);
        let target = processor.power_spectrum(&samples);

        let mut avg = vec![0.0; 64];
        for _ in 0..200 {
            processor.average_into(&samples, 0.1, &mut avg);
        }
        for (a, t) in avg.iter().zip(&target) {
            assert!((a - t).abs() <= 1e-3 * t.max(1.0));
        }
    }
}
