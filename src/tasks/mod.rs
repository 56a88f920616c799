//! Cancellable analysis tasks
//!
//! Each task processes its window in chunks. Between chunks the controller
//! publishes progress and checks for cancellation, so a task never holds
//! the worker for more than one chunk.
//!
//! - `carrier_detector` - estimate the residual carrier of a window
//! - `carrier_xlator` - mix a window down by a given carrier
//! - `doppler` - power spectrum, spread and radial velocity
//! - `wave_sampler` - symbol clock recovery and symbol sampling

pub mod carrier_detector;
pub mod carrier_xlator;
pub mod doppler;
pub mod wave_sampler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::{
    CarrierEstimate, ComplexSample, DopplerResult, SamplingSpace, SigscopeError, SymbolBatch,
};

pub use carrier_detector::CarrierDetector;
pub use carrier_xlator::CarrierXlator;
pub use doppler::DopplerCalculator;
pub use wave_sampler::WaveSampler;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a task sees of the worker while it runs
pub struct TaskContext<'a> {
    cancel: &'a CancelToken,
    symbols: &'a dyn Fn(SymbolBatch),
}

impl<'a> TaskContext<'a> {
    pub fn new(cancel: &'a CancelToken, symbols: &'a dyn Fn(SymbolBatch)) -> Self {
        Self { cancel, symbols }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Publish an incremental batch of symbols
    pub fn emit_symbols(&self, batch: SymbolBatch) {
        (self.symbols)(batch);
    }
}

/// Translated copy of a window
#[derive(Debug, Clone)]
pub struct TranslatedCapture {
    pub data: Vec<ComplexSample>,
    /// Angular frequency that was removed (radians/sample)
    pub omega: f64,
}

/// Summary of a completed sampling run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingSummary {
    pub symbols: usize,
    pub space: SamplingSpace,
    /// Symbol rate in Hz (the final loop estimate in Gardner mode)
    pub rate: f64,
    pub samples_per_symbol: f64,
}

/// Result of a successful task
#[derive(Debug, Clone)]
pub enum TaskOutput {
    Carrier(CarrierEstimate),
    Translated(TranslatedCapture),
    Doppler(DopplerResult),
    Sampled(SamplingSummary),
}

/// Outcome of one unit of work
#[derive(Debug)]
pub enum Step {
    Continue,
    Done(TaskOutput),
    Cancelled,
    Failed(SigscopeError),
}

/// A long-running task driven by the controller
pub trait CancellableTask: Send {
    /// Process one chunk
    fn work(&mut self, ctx: &TaskContext<'_>) -> Step;

    /// Fraction of the work done, in `[0, 1]`
    fn progress(&self) -> f32;

    /// Human-readable status line
    fn status(&self) -> String;
}

/// Fraction of `total` covered by `done`, treating an empty job as finished
pub(crate) fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        (done as f64 / total as f64).clamp(0.0, 1.0) as f32
    }
}
