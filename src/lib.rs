//! Sigscope
//!
//! Carrier synchronization and symbol timing recovery for recorded complex
//! baseband captures.
//!
//! ## Architecture (Hexagonal / Ports & Adapters)
//!
//! - `domain/` - Pure domain types, no I/O dependencies
//! - `dsp/` - Signal processing building blocks (pure functions, no I/O)
//! - `tasks/` - Chunked, cancellable analysis tasks built on `dsp/`
//! - `controller` - Single-task background worker and its notifications
//! - `ports/` - Trait definitions for captures and displays
//! - `adapters/` - Implementations of ports (cf32 files, recording sink)
//! - `profiles` - Analysis profile persistence
//! - `session` - Orchestration of a capture, its tasks and its display

// Core domain (pure, no I/O)
pub mod domain;
pub mod dsp;
pub mod ports;
pub mod tasks;

// Background execution
pub mod controller;

// Adapters (external I/O)
pub mod adapters;
pub mod profiles;

// Orchestration
pub mod session;
