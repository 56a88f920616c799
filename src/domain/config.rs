//! Analysis profiles
//!
//! A profile is a saved set of operator settings for the analysis tools:
//! carrier detector tuning, Doppler parameters and wave sampler defaults.

use serde::{Deserialize, Serialize};

use super::types::{ClockSync, SamplingSpace};

/// Propagation speed used for RF Doppler conversion (m/s)
pub const SPEED_OF_LIGHT: f64 = 3e8;

/// Strategy used by the carrier detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorMethod {
    /// Mean phase rotation between consecutive samples
    PhaseDifference,
    /// Peak of an averaged power spectrum
    Spectral,
}

fn default_chunk_size() -> usize {
    65536
}

fn default_propagation_speed() -> f64 {
    SPEED_OF_LIGHT
}

/// A saved analysis profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisProfile {
    /// Profile name (e.g., "Default", "NOAA APT")
    pub name: String,
    pub detector_method: DetectorMethod,
    /// Averaging bandwidth as a fraction of the sample rate, in (0, 1]
    pub averaging: f64,
    /// DC notch bandwidth as a fraction of the sample rate, in (0, 1]
    pub dc_notch: f64,
    /// FFT size for the spectral detector
    pub resolution: usize,
    /// Largest FFT used by the Doppler calculator
    pub doppler_max_fft: usize,
    #[serde(default = "default_propagation_speed")]
    pub propagation_speed: f64,
    pub space: SamplingSpace,
    pub sync: ClockSync,
    /// Raw Gardner loop gain as entered by the operator (dB)
    pub raw_loop_gain: f32,
    /// Symbol count used in partition mode
    pub partition_count: u64,
    /// Subdivisions of a periodic selection
    pub divisions: u32,
    /// Samples processed by a task between cancellation checks
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for AnalysisProfile {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            detector_method: DetectorMethod::PhaseDifference,
            averaging: 0.1,
            dc_notch: 0.001,
            resolution: 1024,
            doppler_max_fft: 65536,
            propagation_speed: default_propagation_speed(),
            space: SamplingSpace::Phase,
            sync: ClockSync::Manual,
            raw_loop_gain: -20.0,
            partition_count: 100,
            divisions: 1,
            chunk_size: default_chunk_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_has_sensible_values() {
        let profile = AnalysisProfile::default();
        assert_eq!(profile.name, "Default");
        assert!(profile.averaging > 0.0 && profile.averaging <= 1.0);
        assert!(profile.dc_notch > 0.0 && profile.dc_notch <= 1.0);
        assert!(profile.resolution.is_power_of_two());
        assert_eq!(profile.propagation_speed, 3e8);
    }

    #[test]
    fn profile_serializes_to_json() {
        let profile = AnalysisProfile::default();
        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("\"name\":\"Default\""));
        assert!(json.contains("\"detector_method\":\"PhaseDifference\""));
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let mut value = serde_json::to_value(AnalysisProfile::default()).unwrap();
        let map = value.as_object_mut().unwrap();
        map.remove("chunk_size");
        map.remove("propagation_speed");
        let profile: AnalysisProfile = serde_json::from_value(value).unwrap();
        assert_eq!(profile.chunk_size, 65536);
        assert_eq!(profile.propagation_speed, SPEED_OF_LIGHT);
    }
}
