//! Command-line front end: load a `cf32` capture and run one analysis.
//!
//!   RUST_LOG=sigscope_lib=debug sigscope --input pass.cf32 --fs 48000 detect

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use sigscope_lib::adapters::{write_cf32, Cf32FileSource, RecordingSink};
use sigscope_lib::domain::{
    AnalysisProfile, ClockSync, DetectorMethod, Frequency, SamplingSpace, SigscopeError,
    SigscopeResult,
};
use sigscope_lib::profiles;
use sigscope_lib::session::{AnalysisSession, TaskOutcome};

/// Longest we wait for a single task
const TASK_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum SpaceArg {
    Amplitude,
    Phase,
    Frequency,
}

impl From<SpaceArg> for SamplingSpace {
    fn from(space: SpaceArg) -> Self {
        match space {
            SpaceArg::Amplitude => SamplingSpace::Amplitude,
            SpaceArg::Phase => SamplingSpace::Phase,
            SpaceArg::Frequency => SamplingSpace::Frequency,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum SyncArg {
    Manual,
    Gardner,
    Selection,
    Partition,
}

impl From<SyncArg> for ClockSync {
    fn from(sync: SyncArg) -> Self {
        match sync {
            SyncArg::Manual => ClockSync::Manual,
            SyncArg::Gardner => ClockSync::Gardner,
            SyncArg::Selection => ClockSync::Selection,
            SyncArg::Partition => ClockSync::Partition,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum DetectorArg {
    PhaseDifference,
    Spectral,
}

#[derive(Parser, Debug)]
#[command(name = "sigscope", version, about)]
struct Cli {
    /// Raw interleaved little-endian f32 I/Q capture
    #[arg(long)]
    input: PathBuf,

    /// Sample rate of the capture (Hz)
    #[arg(long)]
    fs: f64,

    /// RF frequency the capture is centred on (Hz)
    #[arg(long, default_value_t = 0.0)]
    center: f64,

    /// Directory holding saved analysis profiles
    #[arg(long)]
    profile_dir: Option<PathBuf>,

    /// Profile to load from the profile directory
    #[arg(long, default_value = profiles::DEFAULT_PROFILE)]
    profile: String,

    /// First sample of the selection
    #[arg(long)]
    start: Option<i64>,

    /// End of the selection (exclusive)
    #[arg(long)]
    end: Option<i64>,

    /// Periodic divisions of the selection
    #[arg(long)]
    divisions: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Length, duration and statistics of the capture or selection
    Stats,

    /// Estimate the residual carrier
    Detect {
        #[arg(long, value_enum)]
        method: Option<DetectorArg>,
    },

    /// Translate the capture to baseband and write it out
    Translate {
        #[arg(long)]
        output: PathBuf,

        /// Carrier to remove (Hz); detected when omitted
        #[arg(long, allow_negative_numbers = true)]
        freq: Option<f64>,
    },

    /// Doppler spectrum and radial velocity
    Doppler {
        /// Transmitter reference frequency (Hz); defaults to the centre
        #[arg(long)]
        reference: Option<f64>,
    },

    /// Recover the symbol clock and sample symbols
    Sample {
        /// Symbol rate (Hz), nominal rate for Gardner
        #[arg(long, default_value_t = 0.0)]
        rate: f64,

        #[arg(long, value_enum)]
        space: Option<SpaceArg>,

        #[arg(long, value_enum)]
        sync: Option<SyncArg>,

        /// Symbol count for partition mode
        #[arg(long)]
        count: Option<u64>,

        /// Raw Gardner loop gain (dB)
        #[arg(long, allow_negative_numbers = true)]
        gain: Option<f32>,

        /// Print every sampled symbol
        #[arg(long)]
        dump: bool,
    },
}

fn load_profile(cli: &Cli) -> SigscopeResult<AnalysisProfile> {
    match &cli.profile_dir {
        Some(dir) => profiles::load_profile(dir, &cli.profile),
        None => Ok(AnalysisProfile::default()),
    }
}

/// Wait for the task just submitted and turn a failed run into an error
fn finish(session: &mut AnalysisSession) -> SigscopeResult<()> {
    match session.wait_idle(TASK_TIMEOUT)? {
        Some(TaskOutcome::Done { .. }) | None => Ok(()),
        Some(TaskOutcome::Cancelled { name }) => {
            Err(SigscopeError::Task(format!("'{name}' was cancelled")))
        }
        Some(TaskOutcome::Failed { name, message }) => {
            Err(SigscopeError::Task(format!("'{name}' failed: {message}")))
        }
    }
}

fn run(cli: Cli) -> SigscopeResult<()> {
    let mut profile = load_profile(&cli)?;
    if let Some(divisions) = cli.divisions {
        profile.divisions = divisions.max(1);
    }

    let sink = RecordingSink::new();
    let mut session = AnalysisSession::new(Box::new(sink.clone()), profile);
    let mut source = Cf32FileSource::new(&cli.input, cli.fs, Frequency::hz(cli.center));
    session.load(&mut source)?;

    if cli.start.is_some() || cli.end.is_some() {
        let len = session.display_data().len() as i64;
        session.set_selection(cli.start.unwrap_or(0), cli.end.unwrap_or(len));
    }

    match cli.command {
        Command::Stats => {
            let m = session.measures();
            println!("length:   {} samples", m.length);
            println!("duration: {:.6} s", m.duration);
            println!("mean:     {}", m.stats.mean);
            println!("rms:      {}", m.stats.rms);
            println!("min:      {}", m.stats.min);
            println!("max:      {}", m.stats.max);
            if let Some(sel) = m.selection {
                println!(
                    "selection: {}..{} ({:.6} s .. {:.6} s, {:.6} s)",
                    sel.start, sel.end, sel.start_time, sel.end_time, sel.length_time
                );
                println!("period:   {:.9} s", sel.period);
                println!("baud:     {:.6}", sel.baud);
            }
        }
        Command::Detect { method } => {
            if let Some(method) = method {
                let mut profile = session.profile().clone();
                profile.detector_method = match method {
                    DetectorArg::PhaseDifference => DetectorMethod::PhaseDifference,
                    DetectorArg::Spectral => DetectorMethod::Spectral,
                };
                session.set_profile(profile);
            }
            session.guess_carrier()?;
            finish(&mut session)?;
            println!("carrier: {:.3} Hz", session.sync_freq().as_hz());
        }
        Command::Translate { output, freq } => {
            match freq {
                Some(freq) => session.set_sync_freq(Frequency::hz(freq)),
                None => {
                    session.guess_carrier()?;
                    finish(&mut session)?;
                }
            }
            log::info!("Removing carrier at {:.3} Hz", session.sync_freq().as_hz());
            session.sync_carrier()?;
            finish(&mut session)?;
            write_cf32(&output, session.display_data())?;
            println!(
                "wrote {} samples to {}",
                session.display_data().len(),
                output.display()
            );
        }
        Command::Doppler { reference } => {
            if let Some(reference) = reference {
                session.set_reference_freq(Frequency::hz(reference));
            }
            session.compute_doppler()?;
            finish(&mut session)?;
            let rec = sink.recorded();
            if let Some(result) = rec.doppler.as_ref() {
                println!("peak:      {:.3} Hz", result.freq);
                println!("spread:    {:.3} Hz", result.sigma);
                println!("velocity:  {:.3} m/s", result.velocity);
                println!("sigma:     {:.3} m/s", result.velocity_sigma);
                println!("resolution: {:.3} Hz", result.resolution);
            }
        }
        Command::Sample {
            rate,
            space,
            sync,
            count,
            gain,
            dump,
        } => {
            let mut profile = session.profile().clone();
            if let Some(space) = space {
                profile.space = space.into();
            }
            if let Some(sync) = sync {
                profile.sync = sync.into();
            }
            if let Some(count) = count {
                profile.partition_count = count;
            }
            if let Some(gain) = gain {
                profile.raw_loop_gain = gain;
            }
            session.set_profile(profile);

            let props = session.sampling_properties(rate);
            session.sample(props)?;
            finish(&mut session)?;

            let rec = sink.recorded();
            println!("symbols: {}", rec.symbols.len());
            if dump {
                for s in &rec.symbols {
                    println!("{:.6} {:.6} {:.6}", s.iq.re, s.iq.im, s.value);
                }
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
