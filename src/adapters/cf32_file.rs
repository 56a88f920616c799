//! Raw `cf32` capture files
//!
//! The format carries no header: each sample is two little-endian `f32`
//! values, I then Q. Sample rate and centre frequency come from the caller.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::domain::{ComplexSample, Frequency, SigscopeError, SigscopeResult};
use crate::ports::CaptureSource;

/// Bytes per complex sample
const SAMPLE_BYTES: u64 = 8;

/// Capture backed by a `cf32` file
pub struct Cf32FileSource {
    path: PathBuf,
    sample_rate: f64,
    center: Frequency,
}

impl Cf32FileSource {
    pub fn new(path: impl Into<PathBuf>, sample_rate: f64, center: Frequency) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            center,
        }
    }
}

impl CaptureSource for Cf32FileSource {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn center_frequency(&self) -> Frequency {
        self.center
    }

    fn read_samples(&mut self) -> SigscopeResult<Vec<ComplexSample>> {
        let file = File::open(&self.path)?;
        let bytes = file.metadata()?.len();
        if bytes % SAMPLE_BYTES != 0 {
            log::warn!(
                "{}: {} trailing bytes ignored",
                self.path.display(),
                bytes % SAMPLE_BYTES
            );
        }

        let count = (bytes / SAMPLE_BYTES) as usize;
        let mut reader = BufReader::new(file).take(count as u64 * SAMPLE_BYTES);
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let re = reader.read_f32::<LittleEndian>()?;
            let im = reader.read_f32::<LittleEndian>()?;
            samples.push(ComplexSample::new(re, im));
        }

        if samples.is_empty() {
            return Err(SigscopeError::Capture(format!(
                "{} contains no samples",
                self.path.display()
            )));
        }

        log::info!(
            "Loaded {} samples from {} ({:.3} s at {} Hz)",
            samples.len(),
            self.path.display(),
            samples.len() as f64 / self.sample_rate.max(f64::MIN_POSITIVE),
            self.sample_rate
        );
        Ok(samples)
    }
}

/// Write samples as a `cf32` file
pub fn write_cf32(path: &Path, samples: &[ComplexSample]) -> SigscopeResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for s in samples {
        writer.write_f32::<LittleEndian>(s.re)?;
        writer.write_f32::<LittleEndian>(s.im)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.cf32");
        let samples: Vec<ComplexSample> = (0..1000)
            .map(|i| ComplexSample::new(i as f32 * 0.5, -(i as f32)))
            .collect();
        write_cf32(&path, &samples).unwrap();

        let mut source = Cf32FileSource::new(&path, 48000.0, Frequency::mhz(137.1));
        assert_eq!(source.read_samples().unwrap(), samples);
        assert_eq!(source.sample_rate(), 48000.0);
        assert_eq!(source.center_frequency(), Frequency::mhz(137.1));
    }

    #[test]
    fn file_layout_is_interleaved_little_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.cf32");
        write_cf32(&path, &[ComplexSample::new(1.0, -2.0)]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&1.0f32.to_le_bytes());
        expected.extend_from_slice(&(-2.0f32).to_le_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.cf32");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.25f32.to_le_bytes());
        bytes.extend_from_slice(&0.75f32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        std::fs::write(&path, bytes).unwrap();

        let mut source = Cf32FileSource::new(&path, 1000.0, Frequency::hz(0.0));
        assert_eq!(source.read_samples().unwrap(), vec![ComplexSample::new(0.25, 0.75)]);
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.cf32");
        std::fs::write(&path, b"").unwrap();
        let mut source = Cf32FileSource::new(&path, 1000.0, Frequency::hz(0.0));
        assert!(matches!(source.read_samples(), Err(SigscopeError::Capture(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = Cf32FileSource::new(dir.path().join("nope.cf32"), 1000.0, Frequency::hz(0.0));
        assert!(matches!(source.read_samples(), Err(SigscopeError::Io(_))));
    }
}
