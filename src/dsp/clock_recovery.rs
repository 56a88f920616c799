//! Symbol timing recovery
//!
//! Two clocks drive the wave sampler:
//! - `FixedClock` strobes at the centre of every symbol for a known rate
//! - `GardnerClock` tracks the symbol period with a Gardner timing error
//!   detector and a proportional-integral loop filter
//!
//! Both work on fractional sample positions; the caller interpolates the
//! waveform at the positions the clock asks for.

use crate::domain::ComplexSample;

/// Maximum deviation of the tracked period from the nominal one
const MAX_DEVIATION: f64 = 0.1;

/// Keeps the error normalization finite on silent input
const POWER_FLOOR: f32 = 1e-12;

/// Open-loop clock strobing at `(k + 0.5) · sps`
pub struct FixedClock {
    samples_per_symbol: f64,
    index: u64,
}

impl FixedClock {
    pub fn new(samples_per_symbol: f64) -> Self {
        Self {
            samples_per_symbol,
            index: 0,
        }
    }

    /// Position of the next strobe, advancing the clock
    pub fn next_position(&mut self) -> f64 {
        let pos = (self.index as f64 + 0.5) * self.samples_per_symbol;
        self.index += 1;
        pos
    }

}

/// Closed-loop Gardner symbol clock
///
/// Timing error: `e = Re{conj(x[k - 1/2]) · (x[k - 1] - x[k])}`, normalized
/// by the mean power of the two strobes. A positive error means the strobes
/// are early. The phase correction is limited to half a symbol, so strobes
/// always advance by between `omega / 2` and `3 · omega / 2` samples.
pub struct GardnerClock {
    nominal: f64,
    /// Current samples-per-symbol estimate
    omega: f64,
    /// Position of the next strobe
    position: f64,
    /// Proportional (phase) gain
    gain_mu: f64,
    /// Integral (period) gain
    gain_omega: f64,
    last_strobe: Option<ComplexSample>,
    last_error: f64,
}

impl GardnerClock {
    /// Create a clock for the given nominal samples per symbol. The
    /// integral gain is derived from the loop gain as `gain² / 4`.
    pub fn new(samples_per_symbol: f64, loop_gain: f32) -> Self {
        let gain_mu = loop_gain.max(0.0) as f64;
        Self {
            nominal: samples_per_symbol,
            omega: samples_per_symbol,
            position: samples_per_symbol / 2.0,
            gain_mu,
            gain_omega: gain_mu * gain_mu / 4.0,
            last_strobe: None,
            last_error: 0.0,
        }
    }

    /// Position of the next strobe
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Position of the mid-symbol sample preceding the next strobe
    pub fn mid_position(&self) -> f64 {
        (self.position - self.omega / 2.0).max(0.0)
    }

    /// Current samples-per-symbol estimate
    pub fn samples_per_symbol(&self) -> f64 {
        self.omega
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    /// Feed the timing values sampled at `mid_position()` and `position()`
    /// and advance to the next strobe.
    pub fn strobe(&mut self, mid: ComplexSample, current: ComplexSample) {
        let error = match self.last_strobe {
            Some(prev) => {
                let power = (prev.norm_sqr() + current.norm_sqr()) / 2.0 + POWER_FLOOR;
                ((mid.conj() * (prev - current)).re / power) as f64
            }
            None => 0.0,
        };
        self.last_error = error;
        self.last_strobe = Some(current);

        self.omega += self.gain_omega * error;
        self.omega = self.omega.clamp(
            self.nominal * (1.0 - MAX_DEVIATION),
            self.nominal * (1.0 + MAX_DEVIATION),
        );

        let half = self.omega / 2.0;
        self.position += self.omega + (self.gain_mu * error).clamp(-half, half);
    }
}
