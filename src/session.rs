//! Analysis session
//!
//! Owns a capture and everything the operator sets up around it: sample
//! rate, centre and reference frequencies, the current selection and the
//! carrier sync frequency. Analysis runs on a `CancellableController`; the
//! session turns the controller's notifications into updates of its own
//! state and of the attached `DisplaySink`.
//!
//! Sampled symbols are staged per run. A run that completes replaces the
//! symbols on display in one step; a cancelled or failed run leaves the
//! display untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::controller::{CancellableController, TaskEvent, TaskHandle, TaskNotification};
use crate::domain::{
    AnalysisProfile, ClockSync, ComplexSample, DecibelGain, Frequency, GainCalibration,
    PeriodicSelection, SampleWindow, SamplingProperties, SigscopeError, SigscopeResult, Symbol,
};
use crate::dsp::WindowStats;
use crate::ports::{CaptureSource, DisplaySink};
use crate::tasks::carrier_detector::instantaneous_frequency;
use crate::tasks::{
    CancellableTask, CarrierDetector, CarrierXlator, DopplerCalculator, TaskOutput, WaveSampler,
};

pub const TASK_GUESS_CARRIER: &str = "guessCarrier";
pub const TASK_XLATE_CARRIER: &str = "xlateCarrier";
pub const TASK_DOPPLER: &str = "doppler";
pub const TASK_SAMPLER: &str = "sampler";

/// Upper bound on sample pairs averaged for the cursor read-out
pub const MAX_DOPPLER_ITERS: usize = 100_000;

/// Measurements over the selection, or the whole display data
#[derive(Debug, Clone, PartialEq)]
pub struct Measures {
    /// Display data length in samples
    pub length: usize,
    /// Display data duration in seconds
    pub duration: f64,
    pub stats: WindowStats,
    pub selection: Option<SelectionMeasures>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionMeasures {
    pub start: usize,
    pub end: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub length_time: f64,
    /// Duration of one division (seconds)
    pub period: f64,
    /// Divisions per second
    pub baud: f64,
}

/// Read-out at a cursor position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorReading {
    /// Fractional sample index under the cursor
    pub position: f64,
    pub value: ComplexSample,
    /// Frequency shift of the signal around the cursor (Hz)
    pub frequency: Option<f64>,
    /// Radial velocity implied by that shift (m/s)
    pub doppler: Option<f64>,
}

/// How a task run ended
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Done { name: String },
    Cancelled { name: String },
    Failed { name: String, message: String },
}

/// What the session knows about the task in flight
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Idle,
    Running {
        name: String,
        fraction: f32,
        status: String,
    },
    Cancelling {
        name: String,
    },
}

struct Pending {
    handle: TaskHandle,
    /// Data epoch the task was submitted against
    epoch: u64,
}

/// Symbols received from one sampler run, not yet on display
struct StagedSymbols {
    id: u64,
    symbols: Vec<Symbol>,
}

pub struct AnalysisSession {
    capture: Arc<[ComplexSample]>,
    display: Arc<[ComplexSample]>,
    translated: bool,
    /// Bumped whenever the capture is replaced
    epoch: u64,
    sample_rate: f64,
    center_freq: f64,
    reference_freq: f64,
    selection: Option<PeriodicSelection>,
    /// Carrier frequency used by `sync_carrier` (Hz)
    sync_freq: f64,
    /// Samples averaged by the cursor read-out without a selection
    cursor_span: usize,
    profile: AnalysisProfile,
    gain_calibration: Box<dyn GainCalibration + Send>,
    controller: CancellableController,
    notifications: Receiver<TaskNotification>,
    sink: Box<dyn DisplaySink>,
    pending: Option<Pending>,
    state: TaskState,
    staged: Option<StagedSymbols>,
    last_sampling: Option<SamplingProperties>,
}

impl AnalysisSession {
    pub fn new(sink: Box<dyn DisplaySink>, profile: AnalysisProfile) -> Self {
        let controller = CancellableController::new();
        let notifications = controller.notifications();
        let empty: Arc<[ComplexSample]> = Arc::from(Vec::new());
        Self {
            capture: empty.clone(),
            display: empty,
            translated: false,
            epoch: 0,
            sample_rate: 1.0,
            center_freq: 0.0,
            reference_freq: 0.0,
            selection: None,
            sync_freq: 0.0,
            cursor_span: 1,
            profile,
            gain_calibration: Box::new(DecibelGain),
            controller,
            notifications,
            sink,
            pending: None,
            state: TaskState::Idle,
            staged: None,
            last_sampling: None,
        }
    }

    /// Load a capture from a source, taking its rate and centre frequency
    pub fn load(&mut self, source: &mut dyn CaptureSource) -> SigscopeResult<()> {
        let samples = source.read_samples()?;
        self.set_data(samples.into(), source.sample_rate())?;
        self.set_center_freq(source.center_frequency());
        Ok(())
    }

    /// Replace the capture. Any running task is cancelled and its result
    /// will not be applied.
    pub fn set_data(&mut self, data: Arc<[ComplexSample]>, sample_rate: f64) -> SigscopeResult<()> {
        if !(sample_rate > 0.0) {
            return Err(SigscopeError::Config(format!(
                "invalid sample rate {sample_rate}"
            )));
        }
        if self.controller.cancel() {
            log::info!("Capture replaced; cancelling running task");
        }

        self.epoch += 1;
        self.capture = data.clone();
        self.display = data;
        self.translated = false;
        self.sample_rate = sample_rate;
        self.selection = None;
        self.sync_freq = 0.0;
        log::info!(
            "Capture set: {} samples at {} Hz",
            self.capture.len(),
            sample_rate
        );
        self.sink.display_data_changed(self.display.len());
        Ok(())
    }

    /// Set the capture centre frequency. The reference follows it.
    pub fn set_center_freq(&mut self, center: Frequency) {
        self.center_freq = center.as_hz();
        self.reference_freq = center.as_hz();
    }

    /// Frequency the transmitter is known to use, for Doppler conversion
    pub fn set_reference_freq(&mut self, reference: Frequency) {
        self.reference_freq = reference.as_hz();
    }

    /// Select `[start, end)` of the display data, divided as the profile says
    pub fn set_selection(&mut self, start: i64, end: i64) {
        self.selection = Some(PeriodicSelection::new(start, end, self.profile.divisions));
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Change the number of periodic divisions of the selection
    pub fn set_periodic_divisions(&mut self, divisions: u32) {
        self.profile.divisions = divisions.max(1);
        if let Some(selection) = self.selection.as_mut() {
            selection.divisions = self.profile.divisions;
        }
    }

    pub fn set_sync_freq(&mut self, freq: Frequency) {
        self.sync_freq = freq.as_hz();
    }

    pub fn set_cursor_span(&mut self, samples: usize) {
        self.cursor_span = samples.max(1);
    }

    pub fn set_profile(&mut self, profile: AnalysisProfile) {
        self.profile = profile;
    }

    pub fn set_gain_calibration(&mut self, calibration: Box<dyn GainCalibration + Send>) {
        self.gain_calibration = calibration;
    }

    pub fn profile(&self) -> &AnalysisProfile {
        &self.profile
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn sync_freq(&self) -> Frequency {
        Frequency::hz(self.sync_freq)
    }

    pub fn selection(&self) -> Option<PeriodicSelection> {
        self.selection
    }

    /// Data currently shown: the capture or its translated copy
    pub fn display_data(&self) -> &Arc<[ComplexSample]> {
        &self.display
    }

    pub fn is_translated(&self) -> bool {
        self.translated
    }

    pub fn task_state(&self) -> &TaskState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn full_window(&self) -> SampleWindow {
        SampleWindow::full(self.display.clone())
    }

    /// Selection if there is a non-empty one, otherwise the whole display
    fn analysis_window(&self) -> SampleWindow {
        match self.selection {
            Some(sel) => {
                let window = SampleWindow::new(self.display.clone(), sel.start, sel.end);
                if window.is_empty() {
                    self.full_window()
                } else {
                    window
                }
            }
            None => self.full_window(),
        }
    }

    pub fn measures(&self) -> Measures {
        let length = self.display.len();
        let dt = 1.0 / self.sample_rate;

        let selection = self.selection.and_then(|sel| {
            let (start, end) = sel.clamped(length);
            (end > start).then(|| {
                let period = (end - start) as f64 / sel.divisions.max(1) as f64 * dt;
                SelectionMeasures {
                    start,
                    end,
                    start_time: start as f64 * dt,
                    end_time: end as f64 * dt,
                    length_time: (end - start) as f64 * dt,
                    period,
                    baud: 1.0 / period,
                }
            })
        });

        let stats = match selection {
            Some(sel) => WindowStats::of(&self.display[sel.start..sel.end]),
            None => WindowStats::of(&self.display),
        };

        Measures {
            length,
            duration: length as f64 * dt,
            stats,
            selection,
        }
    }

    /// Value, frequency shift and Doppler velocity at time `t` (seconds).
    /// The frequency is averaged over the selection when there is one,
    /// otherwise over the cursor span.
    pub fn cursor_frequency(&self, t: f64) -> Option<CursorReading> {
        let length = self.display.len();
        if length == 0 {
            return None;
        }

        let position = (t * self.sample_rate).clamp(0.0, (length - 1) as f64);
        let value = self.full_window().interpolate(position);

        let (start, span) = match self.selection.map(|s| s.clamped(length)) {
            Some((start, end)) if end > start => (start as i64, (end - start) as i64),
            _ => (position.floor() as i64, self.cursor_span as i64),
        };

        let frequency = instantaneous_frequency(&self.display, start, span, MAX_DOPPLER_ITERS)
            .map(|omega| Frequency::from_angular(omega, self.sample_rate).as_hz());

        let doppler = frequency.and_then(|freq| {
            (self.reference_freq > 0.0).then(|| {
                let observed = self.center_freq + freq;
                -self.profile.propagation_speed * (observed - self.reference_freq)
                    / self.reference_freq
            })
        });

        Some(CursorReading {
            position,
            value,
            frequency,
            doppler,
        })
    }

    fn submit(
        &mut self,
        name: &str,
        task: Box<dyn CancellableTask>,
    ) -> SigscopeResult<TaskHandle> {
        let handle = self.controller.process(name, task)?;
        log::info!("Started '{name}' on {} samples", self.display.len());
        self.state = TaskState::Running {
            name: name.to_string(),
            fraction: 0.0,
            status: String::new(),
        };
        self.pending = Some(Pending {
            handle: handle.clone(),
            epoch: self.epoch,
        });
        Ok(handle)
    }

    /// Estimate the carrier of the selection (or the whole display)
    pub fn guess_carrier(&mut self) -> SigscopeResult<TaskHandle> {
        let detector = CarrierDetector::from_profile(self.analysis_window(), &self.profile)
            .with_chunk_size(self.profile.chunk_size);
        self.submit(TASK_GUESS_CARRIER, Box::new(detector))
    }

    /// Translate the display data down by the sync frequency
    pub fn sync_carrier(&mut self) -> SigscopeResult<TaskHandle> {
        let window = self.full_window();
        let omega = Frequency::hz(self.sync_freq).to_angular(self.sample_rate);
        let output = vec![ComplexSample::new(0.0, 0.0); window.len()];
        let xlator =
            CarrierXlator::new(window, output, omega).with_chunk_size(self.profile.chunk_size);
        self.submit(TASK_XLATE_CARRIER, Box::new(xlator))
    }

    /// Show the original capture again
    pub fn reset_carrier(&mut self) {
        self.display = self.capture.clone();
        self.translated = false;
        self.sink.display_data_changed(self.display.len());
    }

    /// Doppler spectrum of the selection (or the whole display)
    pub fn compute_doppler(&mut self) -> SigscopeResult<TaskHandle> {
        let window = self.analysis_window();
        let calc = DopplerCalculator::new(self.reference_freq, window, self.sample_rate)
            .with_center_freq(self.center_freq)
            .with_propagation_speed(self.profile.propagation_speed)
            .with_max_fft(self.profile.doppler_max_fft);
        self.submit(TASK_DOPPLER, Box::new(calc))
    }

    /// Sampler settings from the profile for a given symbol rate.
    ///
    /// Selection sync samples the whole display and measures the symbol
    /// period from the selection. Every other mode samples the selection
    /// when there is one.
    pub fn sampling_properties(&self, symbol_rate: f64) -> SamplingProperties {
        let window = match self.profile.sync {
            ClockSync::Selection => self.full_window(),
            _ => self.analysis_window(),
        };
        let mut props = SamplingProperties::new(self.sample_rate, window)
            .with_raw_loop_gain(self.profile.raw_loop_gain, &*self.gain_calibration);
        props.space = self.profile.space;
        props.sync = self.profile.sync;
        props.symbol_rate = symbol_rate;
        props.symbol_count = self.profile.partition_count;
        props.selection = self.selection;
        props
    }

    pub fn sample(&mut self, props: SamplingProperties) -> SigscopeResult<TaskHandle> {
        let handle = self.submit(TASK_SAMPLER, Box::new(WaveSampler::new(props.clone())))?;
        self.last_sampling = Some(props);
        Ok(handle)
    }

    /// Run the sampler again with the last properties
    pub fn resample(&mut self) -> SigscopeResult<TaskHandle> {
        let props = self
            .last_sampling
            .clone()
            .ok_or_else(|| SigscopeError::Sampling("nothing sampled yet".into()))?;
        self.sample(props)
    }

    pub fn cancel(&mut self) -> bool {
        self.controller.cancel()
    }

    /// Apply one notification. Returns the outcome when it ends a run.
    pub fn handle_notification(&mut self, notification: TaskNotification) -> Option<TaskOutcome> {
        let TaskNotification { handle, event } = notification;
        let is_pending = self
            .pending
            .as_ref()
            .is_some_and(|p| p.handle.id == handle.id);
        let stale = self
            .pending
            .as_ref()
            .is_some_and(|p| p.handle.id == handle.id && p.epoch != self.epoch);

        match event {
            TaskEvent::Progress { fraction, status } => {
                if is_pending {
                    self.state = TaskState::Running {
                        name: handle.name,
                        fraction,
                        status,
                    };
                }
                None
            }
            TaskEvent::Cancelling => {
                if is_pending {
                    self.state = TaskState::Cancelling { name: handle.name };
                }
                None
            }
            TaskEvent::Symbols(batch) => {
                match self.staged.as_mut() {
                    Some(staged) if staged.id == handle.id => {
                        staged.symbols.extend(batch.symbols)
                    }
                    _ => {
                        self.staged = Some(StagedSymbols {
                            id: handle.id,
                            symbols: batch.symbols,
                        })
                    }
                }
                None
            }
            TaskEvent::Done(output) => {
                self.finish(&handle, is_pending);
                if stale {
                    log::info!("Discarding '{}' result for a replaced capture", handle.name);
                    self.discard_staged(handle.id);
                } else {
                    self.apply(handle.id, output);
                }
                Some(TaskOutcome::Done { name: handle.name })
            }
            TaskEvent::Cancelled => {
                self.finish(&handle, is_pending);
                self.discard_staged(handle.id);
                Some(TaskOutcome::Cancelled { name: handle.name })
            }
            TaskEvent::Error(message) => {
                self.finish(&handle, is_pending);
                self.discard_staged(handle.id);
                log::warn!("Task '{}' failed: {message}", handle.name);
                Some(TaskOutcome::Failed {
                    name: handle.name,
                    message,
                })
            }
        }
    }

    fn finish(&mut self, handle: &TaskHandle, is_pending: bool) {
        if is_pending {
            self.pending = None;
            self.state = TaskState::Idle;
        } else {
            log::debug!("Terminal event for task #{} not in flight", handle.id);
        }
    }

    fn discard_staged(&mut self, id: u64) {
        if self.staged.as_ref().is_some_and(|s| s.id == id) {
            if let Some(staged) = self.staged.take() {
                log::debug!("Discarded {} staged symbols", staged.symbols.len());
            }
        }
    }

    fn apply(&mut self, id: u64, output: TaskOutput) {
        match output {
            TaskOutput::Carrier(estimate) => {
                let freq = estimate.frequency(self.sample_rate);
                log::info!("Carrier found at {:.3} Hz", freq.as_hz());
                self.sync_freq = freq.as_hz();
                self.sink.show_carrier(freq);
            }
            TaskOutput::Translated(translated) => {
                self.display = translated.data.into();
                self.translated = true;
                self.sink.display_data_changed(self.display.len());
            }
            TaskOutput::Doppler(result) => {
                log::info!(
                    "Doppler: {:.3} Hz, {:.3} ± {:.3} m/s",
                    result.freq,
                    result.velocity,
                    result.velocity_sigma
                );
                self.sink.accept_doppler(result);
            }
            TaskOutput::Sampled(summary) => {
                let symbols = match self.staged.take() {
                    Some(staged) if staged.id == id => staged.symbols,
                    other => {
                        self.staged = other;
                        Vec::new()
                    }
                };
                log::info!(
                    "Sampled {} symbols at {:.3} baud",
                    symbols.len(),
                    summary.rate
                );
                self.sink.clear_symbols();
                self.sink.feed_symbols(&symbols);
            }
        }
    }

    /// Apply every notification already queued, without blocking
    pub fn process_pending(&mut self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.notifications.try_recv() {
                Ok(notification) => outcomes.extend(self.handle_notification(notification)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return outcomes,
            }
        }
    }

    /// Block until the task in flight ends, applying its notifications.
    /// Returns `None` when nothing was running.
    pub fn wait_idle(&mut self, timeout: Duration) -> SigscopeResult<Option<TaskOutcome>> {
        let deadline = Instant::now() + timeout;
        let mut outcome = None;
        while self.pending.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.notifications.recv_timeout(remaining) {
                Ok(notification) => {
                    if let Some(o) = self.handle_notification(notification) {
                        outcome = Some(o);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(SigscopeError::Task("timed out waiting for task".into()));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SigscopeError::Task("controller stopped".into()));
                }
            }
        }
        Ok(outcome)
    }
}
