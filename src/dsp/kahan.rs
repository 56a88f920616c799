//! Compensated (Kahan) reductions over complex sample windows
//!
//! Selections can span millions of samples, where naive f32 summation
//! loses several significant digits. `KahanSum` carries the rounding error
//! of each addition forward into the next one.

use std::ops::{Add, Sub};

use crate::domain::ComplexSample;

/// Running compensated sum
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum<T> {
    sum: T,
    compensation: T,
}

impl<T> KahanSum<T>
where
    T: Copy + Default + Add<Output = T> + Sub<Output = T>,
{
    pub fn new() -> Self {
        Self {
            sum: T::default(),
            compensation: T::default(),
        }
    }

    /// Add a value: `y = x - c; t = sum + y; c = (t - sum) - y; sum = t`
    pub fn add(&mut self, value: T) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    pub fn sum(&self) -> T {
        self.sum
    }
}

/// Mean (complex) and RMS (real) of a window in one compensated pass.
/// An empty window yields zeros.
pub fn kahan_mean_and_rms(data: &[ComplexSample]) -> (ComplexSample, f32) {
    if data.is_empty() {
        return (ComplexSample::new(0.0, 0.0), 0.0);
    }

    let mut mean = KahanSum::<ComplexSample>::new();
    let mut power = KahanSum::<f32>::new();

    for &x in data {
        mean.add(x);
        power.add(x.norm_sqr());
    }

    let len = data.len() as f32;
    // Compensation can leave a tiny negative residue on near-zero input
    let rms = (power.sum() / len).max(0.0).sqrt();
    (mean.sum() / len, rms)
}

/// Element-wise minimum and maximum of the real and imaginary parts.
/// An empty window yields zeros.
pub fn calc_limits(data: &[ComplexSample]) -> (ComplexSample, ComplexSample) {
    if data.is_empty() {
        let zero = ComplexSample::new(0.0, 0.0);
        return (zero, zero);
    }

    let mut min = ComplexSample::new(f32::INFINITY, f32::INFINITY);
    let mut max = ComplexSample::new(f32::NEG_INFINITY, f32::NEG_INFINITY);

    for x in data {
        min.re = min.re.min(x.re);
        min.im = min.im.min(x.im);
        max.re = max.re.max(x.re);
        max.im = max.im.max(x.im);
    }

    (min, max)
}

/// Summary statistics of a window
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowStats {
    pub mean: ComplexSample,
    pub rms: f32,
    pub min: ComplexSample,
    pub max: ComplexSample,
}

impl WindowStats {
    pub fn of(data: &[ComplexSample]) -> Self {
        let (mean, rms) = kahan_mean_and_rms(data);
        let (min, max) = calc_limits(data);
        Self {
            mean,
            rms,
            min,
            max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random(len: usize, seed: u32) -> Vec<ComplexSample> {
        // Small LCG so the test data is deterministic without extra crates
        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
        };
        (0..len)
            .map(|_| ComplexSample::new(next(), next()))
            .collect()
    }

    #[test]
    fn empty_window_yields_zeros() {
        let (mean, rms) = kahan_mean_and_rms(&[]);
        let (min, max) = calc_limits(&[]);
        let zero = ComplexSample::new(0.0, 0.0);
        assert_eq!(mean, zero);
        assert_eq!(rms, 0.0);
        assert_eq!(min, zero);
        assert_eq!(max, zero);
    }

    #[test]
    fn mean_lies_between_limits() {
        for seed in [1, 7, 42, 1234] {
            let data = pseudo_random(5000, seed);
            let stats = WindowStats::of(&data);
            assert!(stats.rms >= 0.0);
            assert!(stats.min.re <= stats.mean.re && stats.mean.re <= stats.max.re);
            assert!(stats.min.im <= stats.mean.im && stats.mean.im <= stats.max.im);
        }
    }

    #[test]
    fn constant_signal_statistics() {
        let data = vec![ComplexSample::new(3.0, -4.0); 1000];
        let (mean, rms) = kahan_mean_and_rms(&data);
        assert!((mean.re - 3.0).abs() < 1e-6);
        assert!((mean.im + 4.0).abs() < 1e-6);
        assert!((rms - 5.0).abs() < 1e-5);
    }

    #[test]
    fn compensated_sum_beats_naive_sum() {
        // 1e7 additions of 0.1 drift badly in plain f32
        let mut kahan = KahanSum::<f32>::new();
        let mut naive = 0.0f32;
        for _ in 0..10_000_000 {
            kahan.add(0.1);
            naive += 0.1;
        }
        let exact = 1_000_000.0f32;
        assert!((kahan.sum() - exact).abs() < 1.0);
        assert!((kahan.sum() - exact).abs() < (naive - exact).abs());
    }

    #[test]
    fn limits_track_each_component_separately() {
        let data = [
            ComplexSample::new(1.0, 5.0),
            ComplexSample::new(-2.0, 0.5),
            ComplexSample::new(0.0, -3.0),
        ];
        let (min, max) = calc_limits(&data);
        assert_eq!(min, ComplexSample::new(-2.0, -3.0));
        assert_eq!(max, ComplexSample::new(1.0, 5.0));
    }
}
