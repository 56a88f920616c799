//! Integration tests: capture file → session → analysis tasks
//!
//! These tests drive the public session API the way the CLI does: write a
//! synthetic capture to disk, load it, run tasks on the background worker
//! and check what reaches the display sink.

use std::f64::consts::PI;
use std::time::Duration;

use sigscope_lib::adapters::{write_cf32, Cf32FileSource, RecordingSink};
use sigscope_lib::domain::{
    AnalysisProfile, ClockSync, ComplexSample, Frequency, SampleWindow, SamplingProperties,
    SamplingSpace, SPEED_OF_LIGHT,
};
use sigscope_lib::session::{AnalysisSession, TaskOutcome};

const WAIT: Duration = Duration::from_secs(60);
const FS: f64 = 48000.0;

/// Deterministic ±1 symbols
fn bits(n: usize) -> Vec<f32> {
    let mut state = 0xACE1u32;
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if state & 1 == 0 { 1.0 } else { -1.0 }
        })
        .collect()
}

fn tone(omega: f64, len: usize) -> Vec<ComplexSample> {
    (0..len)
        .map(|i| {
            let phase = omega * i as f64;
            ComplexSample::new(phase.cos() as f32, phase.sin() as f32)
        })
        .collect()
}

fn session(profile: AnalysisProfile) -> (AnalysisSession, RecordingSink) {
    let sink = RecordingSink::new();
    let session = AnalysisSession::new(Box::new(sink.clone()), profile);
    (session, sink)
}

fn expect_done(session: &mut AnalysisSession) {
    match session.wait_idle(WAIT).unwrap() {
        Some(TaskOutcome::Done { .. }) => {}
        other => panic!("expected a completed task, got {other:?}"),
    }
}

#[test]
fn detect_translate_and_sample_bpsk_capture() {
    let carrier = 1200.0;
    let omega = 2.0 * PI * carrier / FS;
    let preamble = 20_000;
    let sps = 16;
    let symbols = bits(200);

    // Unmodulated preamble followed by rectangular BPSK on the same carrier
    let mut baseband = vec![1.0f32; preamble];
    for &b in &symbols {
        baseband.extend(std::iter::repeat(b).take(sps));
    }
    let capture: Vec<ComplexSample> = tone(omega, baseband.len())
        .into_iter()
        .zip(&baseband)
        .map(|(c, &b)| c * b)
        .collect();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bpsk.cf32");
    write_cf32(&path, &capture).unwrap();

    let (mut session, sink) = session(AnalysisProfile::default());
    let mut source = Cf32FileSource::new(&path, FS, Frequency::mhz(437.0));
    session.load(&mut source).unwrap();
    assert_eq!(session.display_data().len(), capture.len());

    // Carrier from the preamble only
    session.set_selection(0, preamble as i64);
    session.guess_carrier().unwrap();
    expect_done(&mut session);
    assert!(
        (session.sync_freq().as_hz() - carrier).abs() < 1.0,
        "carrier {}",
        session.sync_freq().as_hz()
    );
    assert!(sink.recorded().carrier.is_some());

    session.clear_selection();
    session.sync_carrier().unwrap();
    expect_done(&mut session);
    assert!(session.is_translated());

    // Sample the BPSK part at its symbol rate
    session.set_selection(preamble as i64, capture.len() as i64);
    let props = session.sampling_properties(FS / sps as f64);
    assert_eq!(props.space, SamplingSpace::Phase);
    session.sample(props).unwrap();
    expect_done(&mut session);

    let rec = sink.recorded();
    assert_eq!(rec.symbols.len(), symbols.len());
    for (k, (s, &b)) in rec.symbols.iter().zip(&symbols).enumerate() {
        let decided = if s.value.abs() < std::f32::consts::FRAC_PI_2 { 1.0 } else { -1.0 };
        assert_eq!(decided, b, "symbol {k}: phase {}", s.value);
    }
}

#[test]
fn doppler_sign_follows_shift_direction() {
    let center = 437e6;
    for (offset, approaching) in [(2000.0, true), (-3000.0, false)] {
        let (mut session, sink) = session(AnalysisProfile::default());
        session
            .set_data(tone(2.0 * PI * offset / FS, 32_768).into(), FS)
            .unwrap();
        session.set_center_freq(Frequency::hz(center));
        session.compute_doppler().unwrap();
        expect_done(&mut session);

        let rec = sink.recorded();
        let result = rec.doppler.as_ref().unwrap();
        assert!((result.freq - offset).abs() < result.resolution);
        let expected = -SPEED_OF_LIGHT * offset / center;
        assert!((result.velocity - expected).abs() < SPEED_OF_LIGHT * result.resolution / center);
        assert_eq!(result.velocity < 0.0, approaching);
    }
}

#[test]
fn partition_count_sets_symbol_rate() {
    let data: std::sync::Arc<[ComplexSample]> = vec![ComplexSample::new(1.0, 0.0); 1000].into();
    let mut props = SamplingProperties::new(1000.0, SampleWindow::full(data));
    props.sync = ClockSync::Partition;
    props.symbol_count = 100;
    let clock = props.resolve().unwrap();
    assert!((clock.rate - 100.0).abs() < 1e-9);
    assert_eq!(clock.count, 100);
}

#[test]
fn gardner_session_tracks_off_nominal_rate() {
    let true_sps = 10.3;
    let symbols = bits(2000);
    let len = (symbols.len() as f64 * true_sps) as usize;
    let data: Vec<ComplexSample> = (0..len)
        .map(|n| {
            let k = ((n as f64 / true_sps) as usize).min(symbols.len() - 1);
            ComplexSample::new(symbols[k], 0.0)
        })
        .collect();

    let profile = AnalysisProfile {
        sync: ClockSync::Gardner,
        raw_loop_gain: -20.0,
        ..AnalysisProfile::default()
    };
    let (mut session, sink) = session(profile);
    session.set_data(data.into(), 1000.0).unwrap();

    let props = session.sampling_properties(100.0);
    session.sample(props).unwrap();
    expect_done(&mut session);

    let count = sink.recorded().symbols.len();
    assert!(
        (1980..=2020).contains(&count),
        "{count} symbols for {} transmitted",
        symbols.len()
    );
}

#[test]
fn measures_over_periodic_selection() {
    let (mut session, _) = session(AnalysisProfile::default());
    session
        .set_data(vec![ComplexSample::new(0.5, 0.5); 48_000].into(), FS)
        .unwrap();
    session.set_periodic_divisions(10);
    session.set_selection(4800, 9600);

    let m = session.measures();
    let sel = m.selection.unwrap();
    assert!((m.duration - 1.0).abs() < 1e-12);
    assert!((sel.period - 0.01).abs() < 1e-12);
    assert!((sel.baud - 100.0).abs() < 1e-6);
    assert!((m.stats.rms - 0.5f32.hypot(0.5)).abs() < 1e-5);
}
