//! Port traits (interfaces)
//!
//! These traits define the boundaries between the analysis core and the
//! outside world. Adapters implement them for files, displays and tests.

pub mod capture;
pub mod display;

pub use capture::*;
pub use display::*;
