//! Single-pole IIR filters for complex samples
//!
//! The carrier detector only needs gentle smoothing and a DC notch, so these
//! are one-pole sections rather than FIR designs:
//! `y[n] = y[n-1] + α·(x[n] - y[n-1])`.

use std::f64::consts::PI;

use crate::domain::ComplexSample;

/// Smoothing coefficient for a one-pole section whose bandwidth is
/// `fraction` of the sample rate. Clamped so `fraction >= 1` is a bypass.
pub fn one_pole_alpha(fraction: f64) -> f32 {
    if !(fraction > 0.0) {
        return 0.0;
    }
    if fraction >= 1.0 {
        return 1.0;
    }
    (1.0 - (-2.0 * PI * fraction).exp()) as f32
}

/// One-pole lowpass
pub struct OnePoleLowpass {
    alpha: f32,
    state: ComplexSample,
    primed: bool,
}

impl OnePoleLowpass {
    /// Lowpass with bandwidth `fraction` of the sample rate
    pub fn new(fraction: f64) -> Self {
        Self {
            alpha: one_pole_alpha(fraction),
            state: ComplexSample::new(0.0, 0.0),
            primed: false,
        }
    }

    /// Process a single sample through the filter
    pub fn process(&mut self, sample: ComplexSample) -> ComplexSample {
        // Start from the first sample instead of ramping up from zero
        if !self.primed {
            self.primed = true;
            self.state = sample;
        } else {
            self.state += (sample - self.state) * self.alpha;
        }
        self.state
    }
}

/// DC notch: subtracts a one-pole estimate of the DC component
pub struct DcNotch {
    dc: OnePoleLowpass,
}

impl DcNotch {
    /// Notch whose width is `fraction` of the sample rate
    pub fn new(fraction: f64) -> Self {
        let mut dc = OnePoleLowpass::new(fraction);
        // The DC estimate must ramp up from zero, otherwise the first sample
        // would be cancelled completely
        dc.primed = true;
        Self { dc }
    }

    pub fn process(&mut self, sample: ComplexSample) -> ComplexSample {
        sample - self.dc.process(sample)
    }
}
