use std::time::Duration;

/// Ticks the CPU loop may run before it must yield back to the scheduler.
pub const MAX_SLICE_LENGTH: i64 = 10_000;
/// Ticks credited by [`crate::Timing::idle`].
pub const IDLE_TICKS: u64 = 1_000;
/// Below this much remaining time the dispatch thread polls instead of sleeping.
pub const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// Run dispatch on a dedicated background thread, coupled to the host
    /// clock. When false, time is derived from executed CPU ticks.
    pub multicore: bool,
    pub max_slice_length: i64,
    pub idle_ticks: u64,
    pub spin_threshold: Duration,
    /// Re-arm periodic events relative to the end of the last pause instead
    /// of their original due time, so a resume doesn't replay the backlog.
    pub rebase_after_pause: bool,
    pub thread_name: String,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            multicore: false,
            max_slice_length: MAX_SLICE_LENGTH,
            idle_ticks: IDLE_TICKS,
            spin_threshold: SPIN_THRESHOLD,
            rebase_after_pause: true,
            thread_name: "HostTiming".to_string(),
        }
    }
}
