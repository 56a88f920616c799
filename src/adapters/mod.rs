//! Adapter implementations of port traits
//!
//! - `cf32_file` - raw interleaved little-endian f32 I/Q files
//! - `recording_sink` - display sink that records everything it is shown

pub mod cf32_file;
pub mod recording_sink;

pub use cf32_file::{write_cf32, Cf32FileSource};
pub use recording_sink::{Recorded, RecordingSink};
