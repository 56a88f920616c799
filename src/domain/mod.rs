//! Core domain types
//!
//! Pure types with no I/O dependencies. These represent the core concepts
//! of capture analysis: sample windows, frequencies, sampler settings and
//! the results produced by the analysis tasks.

pub mod config;
pub mod error;
pub mod sampling;
pub mod types;

pub use config::*;
pub use error::*;
pub use sampling::*;
pub use types::*;
