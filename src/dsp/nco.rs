//! Numerically Controlled Oscillator
//!
//! Complex rotating phasor. Instead of evaluating `cos`/`sin` per sample,
//! the phasor is advanced with a single complex multiply per sample and
//! pulled back onto the unit circle every `RENORM_INTERVAL` samples.

use num_complex::Complex;

use crate::domain::ComplexSample;

/// Samples between magnitude renormalizations
pub const RENORM_INTERVAL: usize = 1024;

/// Complex NCO advancing by a fixed angular step per sample
pub struct Nco {
    phasor: Complex<f64>,
    step: Complex<f64>,
    since_renorm: usize,
}

impl Nco {
    /// Create an NCO rotating by `omega` radians/sample
    pub fn new(omega: f64) -> Self {
        Self {
            phasor: Complex::new(1.0, 0.0),
            step: Complex::from_polar(1.0, omega),
            since_renorm: 0,
        }
    }

    /// Return the current phasor and advance by one sample
    pub fn next(&mut self) -> ComplexSample {
        let out = ComplexSample::new(self.phasor.re as f32, self.phasor.im as f32);
        self.phasor *= self.step;

        self.since_renorm += 1;
        if self.since_renorm >= RENORM_INTERVAL {
            self.since_renorm = 0;
            let mag = self.phasor.norm();
            if mag > 0.0 {
                self.phasor /= mag;
            }
        }

        out
    }

    /// Mix a sample with the oscillator
    pub fn mix(&mut self, sample: ComplexSample) -> ComplexSample {
        sample * self.next()
    }
}
