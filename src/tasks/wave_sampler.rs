//! Wave Sampler
//!
//! Recovers the symbol clock of a window and samples one value per symbol.
//!
//! Fixed-rate modes (manual, partition, selection) strobe at the centre of
//! every symbol. Gardner mode starts from the nominal rate and lets the
//! timing loop track it across the window.
//!
//! Each symbol carries the interpolated I/Q sample (constellation) and its
//! projection onto the sampling space (histogram). Symbols are published in
//! batches while the task runs.

use crate::domain::{
    ClockSync, ComplexSample, ResolvedClock, SampleWindow, SamplingProperties, SamplingSpace,
    SigscopeError, Symbol, SymbolBatch,
};
use crate::dsp::clock_recovery::{FixedClock, GardnerClock};

use super::{fraction, CancellableTask, SamplingSummary, Step, TaskContext, TaskOutput};

const DEFAULT_BATCH: usize = 4096;

/// Smoothing of the DC estimate removed from real-valued timing signals
const DC_ALPHA: f32 = 0.05;

enum Clock {
    Fixed(FixedClock),
    Gardner(GardnerClock),
}

/// Cancellable symbol sampler
pub struct WaveSampler {
    props: SamplingProperties,
    batch_size: usize,
    resolved: Option<ResolvedClock>,
    clock: Option<Clock>,
    produced: usize,
    /// Last strobe position, for progress in Gardner mode
    position: f64,
    dc: Option<f32>,
}

impl WaveSampler {
    pub fn new(props: SamplingProperties) -> Self {
        Self {
            props,
            batch_size: DEFAULT_BATCH,
            resolved: None,
            clock: None,
            produced: 0,
            position: 0.0,
            dc: None,
        }
    }

    /// Symbols per published batch
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn last_position(&self) -> f64 {
        self.props.window.len().saturating_sub(1) as f64
    }

    fn symbol_at(window: &SampleWindow, space: SamplingSpace, pos: f64) -> Symbol {
        let iq = window.interpolate(pos);
        let previous = window.interpolate(pos - 1.0);
        Symbol {
            iq,
            value: space.project(iq, previous),
        }
    }

    /// Value fed to the timing error detector at `pos`
    fn timing_value(&mut self, pos: f64) -> ComplexSample {
        let symbol = Self::symbol_at(&self.props.window, self.props.space, pos);
        match self.props.space {
            SamplingSpace::Phase => symbol.iq,
            SamplingSpace::Amplitude | SamplingSpace::Frequency => {
                let dc = self.dc.get_or_insert(symbol.value);
                *dc += DC_ALPHA * (symbol.value - *dc);
                ComplexSample::new(symbol.value - *dc, 0.0)
            }
        }
    }

    fn next_fixed(&mut self, count: u64) -> Option<Symbol> {
        if self.produced as u64 >= count {
            return None;
        }
        let pos = match self.clock.as_mut() {
            Some(Clock::Fixed(clock)) => clock.next_position(),
            _ => return None,
        };
        if pos > self.last_position() {
            return None;
        }
        self.position = pos;
        Some(Self::symbol_at(&self.props.window, self.props.space, pos))
    }

    fn next_gardner(&mut self) -> Option<Symbol> {
        let (pos, mid_pos) = match self.clock.as_ref() {
            Some(Clock::Gardner(clock)) => (clock.position(), clock.mid_position()),
            _ => return None,
        };
        if pos > self.last_position() {
            return None;
        }

        let mid = self.timing_value(mid_pos);
        let current = self.timing_value(pos);
        if let Some(Clock::Gardner(clock)) = self.clock.as_mut() {
            clock.strobe(mid, current);
        }

        self.position = pos;
        Some(Self::symbol_at(&self.props.window, self.props.space, pos))
    }

    fn summary(&self, resolved: &ResolvedClock) -> SamplingSummary {
        let samples_per_symbol = match &self.clock {
            Some(Clock::Gardner(clock)) => clock.samples_per_symbol(),
            _ => resolved.samples_per_symbol,
        };
        SamplingSummary {
            symbols: self.produced,
            space: self.props.space,
            rate: self.props.sample_rate / samples_per_symbol,
            samples_per_symbol,
        }
    }
}

impl CancellableTask for WaveSampler {
    fn work(&mut self, ctx: &TaskContext<'_>) -> Step {
        let resolved = match self.resolved {
            Some(resolved) => resolved,
            None => match self.props.resolve() {
                Ok(resolved) => {
                    log::debug!(
                        "Sampling {:?} space at {:.3} baud ({:.3} samples/symbol, {} symbols, {:?})",
                        self.props.space,
                        resolved.rate,
                        resolved.samples_per_symbol,
                        resolved.count,
                        self.props.sync
                    );
                    self.clock = Some(match self.props.sync {
                        ClockSync::Gardner => Clock::Gardner(GardnerClock::new(
                            resolved.samples_per_symbol,
                            self.props.loop_gain,
                        )),
                        _ => Clock::Fixed(FixedClock::new(resolved.samples_per_symbol)),
                    });
                    self.resolved = Some(resolved);
                    resolved
                }
                Err(err) => return Step::Failed(err),
            },
        };

        if ctx.is_cancelled() {
            return Step::Cancelled;
        }

        let first_index = self.produced;
        let mut symbols = Vec::with_capacity(self.batch_size);
        let mut finished = false;

        while symbols.len() < self.batch_size {
            let next = match self.clock {
                Some(Clock::Fixed(_)) => self.next_fixed(resolved.count),
                Some(Clock::Gardner(_)) => self.next_gardner(),
                None => {
                    return Step::Failed(SigscopeError::Task("sampler clock missing".into()));
                }
            };
            match next {
                Some(symbol) => {
                    symbols.push(symbol);
                    self.produced += 1;
                }
                None => {
                    finished = true;
                    break;
                }
            }
        }

        if !symbols.is_empty() {
            ctx.emit_symbols(SymbolBatch {
                first_index,
                space: self.props.space,
                symbols,
            });
        }

        if finished {
            let summary = self.summary(&resolved);
            log::debug!(
                "Sampled {} symbols at {:.3} baud",
                summary.symbols,
                summary.rate
            );
            Step::Done(TaskOutput::Sampled(summary))
        } else {
            Step::Continue
        }
    }

    fn progress(&self) -> f32 {
        match (&self.clock, &self.resolved) {
            (Some(Clock::Fixed(_)), Some(resolved)) => {
                fraction(self.produced, resolved.count as usize)
            }
            (Some(Clock::Gardner(_)), _) => {
                (self.position / self.last_position().max(1.0)).clamp(0.0, 1.0) as f32
            }
            _ => 0.0,
        }
    }

    fn status(&self) -> String {
        "Sampling...".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PeriodicSelection;
    use crate::tasks::testing::drive;
    use std::f32::consts::PI;
    use std::sync::Arc;

    /// Deterministic ±1 symbol pattern
    fn symbols(n: usize) -> Vec<f32> {
        let mut state = 0x1234_5678u32;
        (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                if state & 1 == 0 { 1.0 } else { -1.0 }
            })
            .collect()
    }

    /// BPSK with linear transitions between symbol centres
    fn bpsk(symbols: &[f32], period: f64) -> Vec<ComplexSample> {
        let len = (symbols.len() as f64 * period) as usize;
        let last = symbols.len() as i64 - 1;
        (0..len)
            .map(|n| {
                let x = n as f64 / period - 0.5;
                let k = x.floor() as i64;
                let f = (x - k as f64) as f32;
                let a = symbols[k.clamp(0, last) as usize];
                let b = symbols[(k + 1).clamp(0, last) as usize];
                ComplexSample::new(a * (1.0 - f) + b * f, 0.0)
            })
            .collect()
    }

    fn run(props: SamplingProperties) -> (SamplingSummary, Vec<Symbol>) {
        let mut sampler = WaveSampler::new(props).with_batch_size(100);
        let (step, batches) = drive(&mut sampler);
        let mut expected_index = 0;
        let mut all = Vec::new();
        for batch in batches {
            assert_eq!(batch.first_index, expected_index);
            expected_index += batch.symbols.len();
            all.extend(batch.symbols);
        }
        match step {
            Step::Done(TaskOutput::Sampled(summary)) => (summary, all),
            other => panic!("expected sampling summary, got {other:?}"),
        }
    }

    #[test]
    fn partition_mode_samples_symbol_centres() {
        let bits = symbols(100);
        let data: Arc<[ComplexSample]> = bpsk(&bits, 10.0).into();
        let mut props = SamplingProperties::new(1000.0, SampleWindow::full(data));
        props.sync = ClockSync::Partition;
        props.symbol_count = 100;

        let (summary, out) = run(props);
        assert_eq!(summary.symbols, 100);
        assert!((summary.rate - 100.0).abs() < 1e-9);
        for (symbol, bit) in out.iter().zip(&bits) {
            assert!((symbol.iq.re - bit).abs() < 1e-6);
        }
    }

    #[test]
    fn phase_space_separates_bpsk_symbols() {
        let bits = symbols(50);
        let data: Arc<[ComplexSample]> = bpsk(&bits, 8.0).into();
        let mut props = SamplingProperties::new(8000.0, SampleWindow::full(data));
        props.symbol_rate = 1000.0;

        let (_, out) = run(props);
        assert_eq!(out.len(), 50);
        for (symbol, bit) in out.iter().zip(&bits) {
            let expected = if *bit > 0.0 { 0.0 } else { PI };
            assert!((symbol.value.abs() - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn amplitude_space_reports_magnitude() {
        let data: Arc<[ComplexSample]> = vec![ComplexSample::new(3.0, 4.0); 100].into();
        let mut props = SamplingProperties::new(100.0, SampleWindow::full(data));
        props.space = SamplingSpace::Amplitude;
        props.symbol_rate = 10.0;

        let (_, out) = run(props);
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|s| (s.value - 5.0).abs() < 1e-6));
    }

    #[test]
    fn frequency_space_reports_rotation() {
        let data: Arc<[ComplexSample]> = crate::tasks::testing::tone(0.25, 1000).into();
        let mut props = SamplingProperties::new(1000.0, SampleWindow::full(data));
        props.space = SamplingSpace::Frequency;
        props.symbol_rate = 50.0;

        let (_, out) = run(props);
        assert!(out.iter().all(|s| (s.value - 0.25).abs() < 1e-4));
    }

    #[test]
    fn selection_mode_uses_periodic_selection() {
        let bits = symbols(40);
        let data: Arc<[ComplexSample]> = bpsk(&bits, 25.0).into();
        let mut props = SamplingProperties::new(1000.0, SampleWindow::full(data));
        props.sync = ClockSync::Selection;
        props.selection = Some(PeriodicSelection::new(100, 200, 4));

        let (summary, out) = run(props);
        assert_eq!(out.len(), 40);
        assert!((summary.rate - 40.0).abs() < 1e-9);
    }

    #[test]
    fn gardner_tracks_rate_mismatch() {
        let bits = symbols(3000);
        let true_period = 10.3;
        let data: Arc<[ComplexSample]> = bpsk(&bits, true_period).into();
        let mut props = SamplingProperties::new(1000.0, SampleWindow::full(data));
        props.sync = ClockSync::Gardner;
        props.symbol_rate = 100.0;
        props.loop_gain = 0.1;

        let (summary, out) = run(props);
        assert!(
            (summary.samples_per_symbol - true_period).abs() < 0.05,
            "sps = {}",
            summary.samples_per_symbol
        );

        // After settling, every decision matches the transmitted symbol
        let errors = out
            .iter()
            .skip(500)
            .zip(bits.iter().skip(500))
            .filter(|(s, b)| (s.iq.re > 0.0) != (**b > 0.0))
            .count();
        assert!(out.len() >= 2990 && out.len() <= 3010, "{} symbols", out.len());
        assert!(errors < 5, "{errors} decision errors");
    }

    #[test]
    fn zero_rate_fails() {
        let data: Arc<[ComplexSample]> = vec![ComplexSample::new(1.0, 0.0); 100].into();
        let props = SamplingProperties::new(100.0, SampleWindow::full(data));
        let mut sampler = WaveSampler::new(props);
        assert!(matches!(
            drive(&mut sampler).0,
            Step::Failed(SigscopeError::Sampling(_))
        ));
    }
}
