//! Virtual-clock event scheduler for hardware emulation.
//!
//! This crate owns the time-ordered dispatch of timed callbacks. It contains no
//! CPU or GPU logic; the execution core drives it through [`timing::Timing`]
//! (tick accounting) and hardware services register [`event::EventType`]s and
//! schedule instances of them. The owning system controller holds the
//! [`timing::CoreTiming`] object and controls its lifecycle.

/// Monotonic clock sources and CPU tick conversions.
pub mod clock;

/// Tunable engine constants.
pub mod config;

/// Error type for the few fallible lifecycle operations.
pub mod error;

/// Event kinds and scheduled event instances.
pub mod event;

/// Run/pause state machine shared with the dispatch thread.
pub mod pause;

/// Auto-reset wake signal.
pub mod signal;

/// Scheduler engine and its owning lifecycle object.
pub mod timing;

mod queue;

pub use clock::{ClockSource, HostClock, ManualClock};
pub use config::TimingConfig;
pub use error::TimingError;
pub use event::{EventType, TimedCallback, create_event};
pub use pause::RunState;
pub use timing::{CoreTiming, Timing, UnscheduleMode};
