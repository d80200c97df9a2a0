//! Headless timing probe for the `emutime-core` scheduler.
//!
//! Registers a handful of representative hardware timers, drives them with a
//! synthetic CPU workload in either scheduling model and summarizes what fired.

/// Probe settings and their TOML persistence.
pub mod config;

pub mod error;

/// Aggregated dispatch trace.
pub mod report;

/// Synthetic emulated-CPU workload.
pub mod workload;
