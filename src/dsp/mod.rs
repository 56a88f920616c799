//! Digital Signal Processing
//!
//! Pure functions and small stateful blocks. No I/O dependencies.

pub mod clock_recovery;
pub mod fft;
pub mod filter;
pub mod kahan;
pub mod nco;

// Re-export commonly used items
pub use fft::FftProcessor;
pub use kahan::{calc_limits, kahan_mean_and_rms, KahanSum, WindowStats};
pub use nco::Nco;
