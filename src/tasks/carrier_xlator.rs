//! Carrier Translator
//!
//! Mixes a window down by a normalized angular frequency, writing into a
//! buffer the caller allocated up front. The source is never touched.

use crate::domain::{ComplexSample, SampleWindow, SigscopeError};
use crate::dsp::Nco;

use super::{fraction, CancellableTask, Step, TaskContext, TaskOutput, TranslatedCapture};

const DEFAULT_CHUNK: usize = 65536;

/// Cancellable frequency translation
pub struct CarrierXlator {
    window: SampleWindow,
    output: Option<Vec<ComplexSample>>,
    omega: f64,
    nco: Nco,
    chunk_size: usize,
    position: usize,
}

impl CarrierXlator {
    /// Translate `window` by `-omega` radians/sample into `output`, which
    /// must already hold `window.len()` samples
    pub fn new(window: SampleWindow, output: Vec<ComplexSample>, omega: f64) -> Self {
        Self {
            window,
            output: Some(output),
            omega,
            nco: Nco::new(-omega),
            chunk_size: DEFAULT_CHUNK,
            position: 0,
        }
    }

    /// Samples processed between cancellation checks
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl CancellableTask for CarrierXlator {
    fn work(&mut self, ctx: &TaskContext<'_>) -> Step {
        if ctx.is_cancelled() {
            return Step::Cancelled;
        }

        let source = self.window.as_slice();
        let Some(output) = self.output.as_mut() else {
            return Step::Failed(SigscopeError::Task("translation already completed".into()));
        };

        if output.len() != source.len() {
            return Step::Failed(SigscopeError::Config(format!(
                "output buffer holds {} samples, window has {}",
                output.len(),
                source.len()
            )));
        }

        let end = (self.position + self.chunk_size).min(source.len());
        for (dst, &src) in output[self.position..end]
            .iter_mut()
            .zip(&source[self.position..end])
        {
            *dst = self.nco.mix(src);
        }
        self.position = end;

        if self.position < source.len() {
            return Step::Continue;
        }

        match self.output.take() {
            Some(data) => Step::Done(TaskOutput::Translated(TranslatedCapture {
                data,
                omega: self.omega,
            })),
            None => Step::Failed(SigscopeError::Task("translation already completed".into())),
        }
    }

    fn progress(&self) -> f32 {
        fraction(self.position, self.window.len())
    }

    fn status(&self) -> String {
        "Translating carrier...".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing::{drive, tone};
    use std::sync::Arc;

    fn translate(samples: Arc<[ComplexSample]>, omega: f64) -> Vec<ComplexSample> {
        let window = SampleWindow::full(samples);
        let output = vec![ComplexSample::new(0.0, 0.0); window.len()];
        let mut xlator = CarrierXlator::new(window, output, omega).with_chunk_size(1000);
        match drive(&mut xlator).0 {
            Step::Done(TaskOutput::Translated(t)) => t.data,
            other => panic!("expected translation, got {other:?}"),
        }
    }

    #[test]
    fn translation_moves_tone_to_baseband() {
        let samples: Arc<[ComplexSample]> = tone(0.4, 10_000).into();
        let out = translate(samples, 0.4);
        for s in &out {
            assert!((s.re - 1.0).abs() < 1e-4 && s.im.abs() < 1e-4, "got {s}");
        }
    }

    #[test]
    fn round_trip_restores_original() {
        let original: Vec<ComplexSample> = (0..50_000)
            .map(|i| {
                let t = i as f32;
                ComplexSample::new((t * 0.013).sin() + 0.5, (t * 0.007).cos() - 0.25)
            })
            .collect();
        let rms = (original.iter().map(|s| s.norm_sqr()).sum::<f32>() / original.len() as f32)
            .sqrt();

        for omega in [-3.0, -1.2, -0.01, 0.3, 2.9] {
            let there = translate(original.clone().into(), omega);
            let back = translate(there.into(), -omega);
            for (a, b) in original.iter().zip(&back) {
                assert!((a - b).norm() <= 1e-5 * rms, "omega {omega}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn source_is_not_modified() {
        let samples: Arc<[ComplexSample]> = tone(0.2, 100).into();
        let before = samples.to_vec();
        translate(samples.clone(), 0.2);
        assert_eq!(&samples[..], &before[..]);
    }

    #[test]
    fn mismatched_output_fails() {
        let window = SampleWindow::full(tone(0.2, 100).into());
        let mut xlator = CarrierXlator::new(window, vec![ComplexSample::new(0.0, 0.0); 10], 0.2);
        assert!(matches!(drive(&mut xlator).0, Step::Failed(SigscopeError::Config(_))));
    }

    #[test]
    fn empty_window_translates_to_empty_buffer() {
        let window = SampleWindow::full(Vec::<ComplexSample>::new().into());
        let mut xlator = CarrierXlator::new(window, Vec::new(), 1.0);
        match drive(&mut xlator).0 {
            Step::Done(TaskOutput::Translated(t)) => assert!(t.data.is_empty()),
            other => panic!("expected translation, got {other:?}"),
        }
    }
}
