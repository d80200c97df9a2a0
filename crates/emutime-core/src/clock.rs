use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Emulated CPU clock rate in Hz.
pub const CPU_TICK_FREQ: u64 = 1_020_000_000;
/// Rate of the architectural system counter (CNTPCT) in Hz.
pub const CNTFREQ: u64 = 19_200_000;
/// Rate of the GPU timestamp counter in Hz.
pub const GPU_TICK_FREQ: u64 = 614_400_000;

const NS_PER_SEC: u64 = 1_000_000_000;
const US_PER_SEC: u64 = 1_000_000;

// Intermediate product is widened so multi-hour tick counts don't overflow.
#[inline]
fn scale(value: u64, num: u64, den: u64) -> u64 {
    ((value as u128 * num as u128) / den as u128) as u64
}

#[inline]
fn scale_ceil(value: u64, num: u64, den: u64) -> u64 {
    (value as u128 * num as u128).div_ceil(den as u128) as u64
}

#[inline]
pub fn cpu_tick_to_ns(ticks: u64) -> u64 {
    scale(ticks, NS_PER_SEC, CPU_TICK_FREQ)
}

#[inline]
pub fn cpu_tick_to_us(ticks: u64) -> u64 {
    scale(ticks, US_PER_SEC, CPU_TICK_FREQ)
}

#[inline]
pub fn cpu_tick_to_cntpct(ticks: u64) -> u64 {
    scale(ticks, CNTFREQ, CPU_TICK_FREQ)
}

#[inline]
pub fn cpu_tick_to_gpu_tick(ticks: u64) -> u64 {
    scale(ticks, GPU_TICK_FREQ, CPU_TICK_FREQ)
}

/// Smallest tick count whose converted time is at least `ns`.
#[inline]
pub fn ns_to_cpu_tick(ns: u64) -> u64 {
    scale_ceil(ns, CPU_TICK_FREQ, NS_PER_SEC)
}

/// A monotonic time source for the multicore scheduling model.
///
/// Implementations must never go backwards; the scheduler does not defend
/// against a clock that does.
pub trait ClockSource: Send + Sync + 'static {
    /// Nanoseconds since the clock's origin.
    fn time_ns(&self) -> u64;

    fn time_us(&self) -> u64 {
        self.time_ns() / 1_000
    }

    /// Architectural counter ticks since the clock's origin.
    fn cntpct(&self) -> u64 {
        scale(self.time_ns(), CNTFREQ, NS_PER_SEC)
    }

    fn gpu_ticks(&self) -> u64 {
        scale(self.time_ns(), GPU_TICK_FREQ, NS_PER_SEC)
    }
}

/// Host wall clock, anchored at construction time.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    origin: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for HostClock {
    fn time_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to.
///
/// Useful for tools and tests that want multicore-mode conversions without
/// host jitter.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ns(&self, ns: u64) {
        self.now_ns.fetch_max(ns, Ordering::AcqRel);
    }

    pub fn advance(&self, delta: Duration) {
        let delta = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.fetch_add(delta, Ordering::AcqRel);
    }
}

impl ClockSource for ManualClock {
    fn time_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Acquire)
    }
}
