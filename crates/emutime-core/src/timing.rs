use std::cell::Cell;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::clock::{self, ClockSource, HostClock};
use crate::config::TimingConfig;
use crate::error::TimingError;
use crate::event::EventType;
use crate::pause::{PauseControl, RunState};
use crate::queue::EventQueue;
use crate::signal::{Signal, lock};

/// Whether [`Timing::unschedule_event`] waits for an in-progress dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnscheduleMode {
    #[default]
    Wait,
    NoWait,
}

thread_local! {
    // Engine whose callback is currently running on this thread.
    static DISPATCHING: Cell<*const Timing> = const { Cell::new(ptr::null()) };
}

struct DispatchScope {
    previous: *const Timing,
}

impl DispatchScope {
    fn enter(timing: &Timing) -> Self {
        let previous = DISPATCHING.with(|d| d.replace(timing as *const Timing));
        Self { previous }
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(self.previous));
    }
}

enum Due {
    After(Duration),
    At(i64),
}

fn duration_ns(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

/// The scheduler engine.
///
/// Shared by reference (usually `Arc<Timing>`) between the CPU core, hardware
/// services and the dispatch thread. Lifecycle is owned by [`CoreTiming`].
pub struct Timing {
    config: TimingConfig,
    clock: Arc<dyn ClockSource>,
    queue: Mutex<EventQueue>,
    /// Held for a whole dispatch pass, callbacks included.
    advance_lock: Mutex<()>,
    wake: Signal,
    pause: PauseControl,
    multicore: AtomicBool,
    has_thread: AtomicBool,
    has_started: AtomicBool,
    shutting_down: AtomicBool,
    pause_end_time: AtomicI64,
    cpu_ticks: AtomicU64,
    downcount: AtomicI64,
}

impl Timing {
    pub fn new(clock: Arc<dyn ClockSource>, config: TimingConfig) -> Self {
        Self {
            multicore: AtomicBool::new(config.multicore),
            config,
            clock,
            queue: Mutex::new(EventQueue::new()),
            advance_lock: Mutex::new(()),
            wake: Signal::new(),
            pause: PauseControl::new(),
            has_thread: AtomicBool::new(false),
            has_started: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            pause_end_time: AtomicI64::new(0),
            cpu_ticks: AtomicU64::new(0),
            downcount: AtomicI64::new(0),
        }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Select the scheduling model. Time queries switch domain immediately;
    /// the dispatch thread is only started or stopped by the next
    /// [`CoreTiming::initialize`].
    pub fn set_multicore(&self, multicore: bool) {
        self.multicore.store(multicore, Ordering::Release);
    }

    pub fn is_multicore(&self) -> bool {
        self.multicore.load(Ordering::Acquire)
    }

    pub fn schedule_event(&self, delay: Duration, kind: &Arc<EventType>) {
        self.insert(Due::After(delay), Duration::ZERO, kind);
    }

    pub fn schedule_event_at(&self, time_ns: i64, kind: &Arc<EventType>) {
        self.insert(Due::At(time_ns), Duration::ZERO, kind);
    }

    /// Schedule `kind` to fire after `start` and then every `period`.
    pub fn schedule_looping_event(
        &self,
        start: Duration,
        period: Duration,
        kind: &Arc<EventType>,
    ) {
        self.insert(Due::After(start), period, kind);
    }

    pub fn schedule_looping_event_at(
        &self,
        start_ns: i64,
        period: Duration,
        kind: &Arc<EventType>,
    ) {
        self.insert(Due::At(start_ns), period, kind);
    }

    fn insert(&self, due: Due, period: Duration, kind: &Arc<EventType>) {
        {
            let mut queue = lock(&self.queue);
            let time = match due {
                Due::After(delay) => self.global_time_ns().saturating_add(duration_ns(delay)),
                Due::At(time) => time,
            };
            let fifo_order = queue.push(time, Arc::downgrade(kind), duration_ns(period));
            debug!(
                "scheduled {} at {time} ns (fifo {fifo_order}, period {} ns)",
                kind.name(),
                period.as_nanos()
            );
        }
        self.wake.set();
    }

    /// Remove every queued instance of `kind` and invalidate any reschedule
    /// its running callback may be about to request.
    ///
    /// With [`UnscheduleMode::Wait`] this also blocks until no dispatch pass
    /// is in flight, so no callback of any kind is still executing on return.
    /// Called from inside a callback of this engine the wait is skipped.
    pub fn unschedule_event(&self, kind: &Arc<EventType>, mode: UnscheduleMode) {
        {
            let mut queue = lock(&self.queue);
            let removed = queue.remove_kind(kind);
            kind.bump_sequence();
            debug!("unscheduled {} ({removed} queued)", kind.name());
        }
        self.wake.set();

        if mode == UnscheduleMode::Wait && !self.in_dispatch() {
            drop(lock(&self.advance_lock));
        }
    }

    pub fn add_ticks(&self, ticks: u64) {
        self.cpu_ticks.fetch_add(ticks, Ordering::AcqRel);
        self.downcount
            .fetch_sub(i64::try_from(ticks).unwrap_or(i64::MAX), Ordering::AcqRel);
    }

    pub fn reset_ticks(&self) {
        self.downcount
            .store(self.config.max_slice_length, Ordering::Release);
    }

    pub fn idle(&self) {
        self.cpu_ticks
            .fetch_add(self.config.idle_ticks, Ordering::AcqRel);
    }

    pub fn downcount(&self) -> i64 {
        self.downcount.load(Ordering::Relaxed)
    }

    pub fn cpu_ticks(&self) -> u64 {
        self.cpu_ticks.load(Ordering::Acquire)
    }

    pub fn clock_ticks(&self) -> u64 {
        if self.is_multicore() {
            self.clock.cntpct()
        } else {
            clock::cpu_tick_to_cntpct(self.cpu_ticks())
        }
    }

    pub fn gpu_ticks(&self) -> u64 {
        if self.is_multicore() {
            self.clock.gpu_ticks()
        } else {
            clock::cpu_tick_to_gpu_tick(self.cpu_ticks())
        }
    }

    pub fn global_time_ns(&self) -> i64 {
        let ns = if self.is_multicore() {
            self.clock.time_ns()
        } else {
            clock::cpu_tick_to_ns(self.cpu_ticks())
        };
        i64::try_from(ns).unwrap_or(i64::MAX)
    }

    pub fn global_time_us(&self) -> i64 {
        let us = if self.is_multicore() {
            self.clock.time_us()
        } else {
            clock::cpu_tick_to_us(self.cpu_ticks())
        };
        i64::try_from(us).unwrap_or(i64::MAX)
    }

    /// Run one dispatch pass: fire every event due at the current virtual
    /// time, in `(time, fifo_order)` order. Returns the due time of the
    /// earliest event left in the queue.
    pub fn advance(&self) -> Option<i64> {
        if self.in_dispatch() {
            return self.next_event_time();
        }

        let _dispatch = lock(&self.advance_lock);
        let mut queue = lock(&self.queue);
        let mut now = self.global_time_ns();

        while let Some(evt) = queue.pop_due(now) {
            let Some(kind) = evt.kind.upgrade() else {
                trace!("dropping event at {} ns: kind no longer exists", evt.time);
                now = self.global_time_ns();
                continue;
            };
            let sequence = kind.sequence_number();

            drop(queue);
            let lateness = now.saturating_sub(evt.time);
            trace!(
                "dispatch {} due {} ns late {lateness} ns",
                kind.name(),
                evt.time
            );
            let requested = {
                let _scope = DispatchScope::enter(self);
                kind.invoke(evt.time, lateness)
            };
            queue = lock(&self.queue);

            if sequence != kind.sequence_number() {
                trace!("discarding stale reschedule of {}", kind.name());
            } else if let Some(delay) = requested
                .map(duration_ns)
                .or((evt.reschedule_time != 0).then_some(evt.reschedule_time))
            {
                let pause_end = self.pause_end_time.load(Ordering::Acquire);
                let next_time = if self.config.rebase_after_pause && evt.time < pause_end {
                    pause_end.saturating_add(delay)
                } else {
                    evt.time.saturating_add(delay)
                };
                queue.push(next_time, evt.kind, delay);
            }

            now = self.global_time_ns();
        }

        queue.next_time()
    }

    /// Cooperative yield point for the single-core CPU loop: once the slice
    /// is used up, run a dispatch pass and start a new slice. Does nothing
    /// while paused. Returns whether a pass ran.
    pub fn service(&self) -> bool {
        if self.downcount() > 0 || !self.is_running() {
            return false;
        }
        self.advance();
        self.reset_ticks();
        true
    }

    pub fn pause(&self, paused: bool) {
        if !paused {
            self.pause_end_time
                .store(self.global_time_ns(), Ordering::Release);
        }
        self.pause
            .request(paused, self.has_thread.load(Ordering::Acquire));
        self.wake.set();
    }

    /// Like [`Timing::pause`], but does not return until the dispatch thread
    /// (if any) has actually reached the requested state.
    ///
    /// Called from a callback of this engine it only requests the change:
    /// the dispatch thread can't park while it is running that callback.
    pub fn sync_pause(&self, paused: bool) {
        let target = if paused {
            RunState::Paused
        } else {
            RunState::Running
        };
        if self.pause.state() == target {
            return;
        }

        self.pause(paused);
        if self.has_thread.load(Ordering::Acquire) && !self.in_dispatch() {
            self.wake.set();
            self.pause.wait_settled(paused, &self.shutting_down);
        }
    }

    pub fn run_state(&self) -> RunState {
        self.pause.state()
    }

    pub fn is_running(&self) -> bool {
        self.pause.state() != RunState::Paused
    }

    pub fn has_started(&self) -> bool {
        self.has_started.load(Ordering::Acquire)
    }

    pub fn has_pending_events(&self) -> bool {
        !lock(&self.queue).is_empty()
    }

    pub fn pending_event_count(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn next_event_time(&self) -> Option<i64> {
        lock(&self.queue).next_time()
    }

    /// Drop every queued event. Registered event kinds are untouched.
    pub fn clear_pending_events(&self) {
        let _dispatch = (!self.in_dispatch()).then(|| lock(&self.advance_lock));
        lock(&self.queue).clear();
        self.wake.set();
    }

    fn in_dispatch(&self) -> bool {
        DISPATCHING.with(|d| ptr::eq(d.get(), self))
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    fn prepare(&self, has_thread: bool) {
        lock(&self.queue).clear();
        self.cpu_ticks.store(0, Ordering::Release);
        self.downcount.store(0, Ordering::Release);
        self.pause_end_time.store(0, Ordering::Release);
        self.shutting_down.store(false, Ordering::Release);
        self.has_thread.store(has_thread, Ordering::Release);
        self.pause.reset();
        self.wake.reset();
    }

    fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.pause.wake_all();
        self.wake.set();
    }

    fn dispatch_loop(&self) {
        self.has_started.store(true, Ordering::Release);
        info!("dispatch thread running");

        while !self.is_shutting_down() {
            while self.pause.state() == RunState::Running && !self.is_shutting_down() {
                match self.advance() {
                    Some(next) => self.wait_until(next),
                    None => self.wake.wait(),
                }
            }
            self.pause.park(&self.shutting_down);
        }

        info!("dispatch thread exiting");
    }

    // Sleep until `deadline`, returning early on any wake signal. The last
    // `spin_threshold` of the wait is polled for precision.
    fn wait_until(&self, deadline: i64) {
        let spin_ns = duration_ns(self.config.spin_threshold);
        loop {
            let remaining = deadline.saturating_sub(self.global_time_ns());
            if remaining <= 0 {
                return;
            }
            if remaining > spin_ns {
                let sleep = Duration::from_nanos((remaining - spin_ns) as u64);
                if self.wake.wait_timeout(sleep) {
                    return;
                }
            } else if self.wake.is_set() {
                self.wake.reset();
                return;
            } else {
                thread::yield_now();
            }
        }
    }
}

/// Owner of a [`Timing`] engine and, in multicore mode, its dispatch thread.
///
/// Dereferences to the engine. Hand [`CoreTiming::handle`] to collaborators
/// that need to outlive a borrow. Dropping this tears the engine down.
pub struct CoreTiming {
    timing: Arc<Timing>,
    thread: Option<JoinHandle<()>>,
}

impl CoreTiming {
    pub fn new() -> Self {
        Self::with_config(TimingConfig::default())
    }

    pub fn with_config(config: TimingConfig) -> Self {
        Self::with_clock(Arc::new(HostClock::new()), config)
    }

    pub fn with_clock(clock: Arc<dyn ClockSource>, config: TimingConfig) -> Self {
        Self {
            timing: Arc::new(Timing::new(clock, config)),
            thread: None,
        }
    }

    pub fn handle(&self) -> Arc<Timing> {
        Arc::clone(&self.timing)
    }

    /// Reset counters and the queue, then start dispatching. In multicore
    /// mode this spawns the dispatch thread, which calls `on_thread_init`
    /// before entering its loop.
    pub fn initialize<F>(&mut self, on_thread_init: F) -> Result<(), TimingError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.reset();

        let multicore = self.timing.is_multicore();
        self.timing.prepare(multicore);

        if !multicore {
            self.timing.has_started.store(true, Ordering::Release);
            info!("core timing initialized (single-core)");
            return Ok(());
        }

        let timing = Arc::clone(&self.timing);
        let spawned = thread::Builder::new()
            .name(self.timing.config.thread_name.clone())
            .spawn(move || {
                on_thread_init();
                timing.dispatch_loop();
            });

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                info!("core timing initialized (multicore)");
                Ok(())
            }
            Err(e) => {
                self.timing.has_thread.store(false, Ordering::Release);
                Err(TimingError::ThreadSpawn(e))
            }
        }
    }

    /// Stop dispatching and join the dispatch thread. Queued events are kept.
    pub fn reset(&mut self) {
        self.timing.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("dispatch thread panicked");
            }
            info!("core timing stopped");
        }
        self.timing.has_thread.store(false, Ordering::Release);
        self.timing.has_started.store(false, Ordering::Release);
    }
}

impl Default for CoreTiming {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for CoreTiming {
    type Target = Timing;

    fn deref(&self) -> &Timing {
        &self.timing
    }
}

impl Drop for CoreTiming {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::create_event;

    fn single_core() -> CoreTiming {
        let mut core = CoreTiming::new();
        core.initialize(|| {}).unwrap();
        core
    }

    fn run_to_ns(core: &CoreTiming, ns: u64) {
        let target = clock::ns_to_cpu_tick(ns);
        core.add_ticks(target.saturating_sub(core.cpu_ticks()));
    }

    #[test]
    fn initialize_single_core_starts_without_thread() {
        let core = single_core();
        assert!(core.has_started());
        assert!(core.is_running());
        assert!(!core.is_multicore());
        assert!(!core.has_pending_events());
    }

    #[test]
    fn reset_ticks_refills_downcount() {
        let core = single_core();
        core.reset_ticks();
        assert_eq!(core.downcount(), 10_000);
        core.add_ticks(2_500);
        assert_eq!(core.downcount(), 7_500);
        assert_eq!(core.cpu_ticks(), 2_500);
    }

    #[test]
    fn idle_credits_ticks_without_touching_downcount() {
        let core = single_core();
        core.reset_ticks();
        core.idle();
        assert_eq!(core.cpu_ticks(), 1_000);
        assert_eq!(core.downcount(), 10_000);
    }

    #[test]
    fn single_core_time_follows_ticks() {
        let core = single_core();
        core.add_ticks(clock::CPU_TICK_FREQ / 1_000);
        assert_eq!(core.global_time_ns(), 1_000_000);
        assert_eq!(core.global_time_us(), 1_000);
        assert_eq!(core.clock_ticks(), 19_200);
        assert_eq!(core.gpu_ticks(), 614_400);
    }

    #[test]
    fn advance_reports_next_due_time() {
        let core = single_core();
        let kind = create_event("k", |_, _| None);
        core.schedule_event(Duration::from_micros(50), &kind);
        core.schedule_event(Duration::from_micros(20), &kind);
        assert_eq!(core.advance(), Some(20_000));

        run_to_ns(&core, 20_000);
        assert_eq!(core.advance(), Some(50_000));

        run_to_ns(&core, 50_000);
        assert_eq!(core.advance(), None);
    }

    #[test]
    fn absolute_scheduling_ignores_current_time() {
        let core = single_core();
        run_to_ns(&core, 1_000_000);
        let kind = create_event("k", |_, _| None);
        core.schedule_event_at(500_000, &kind);
        core.schedule_event(Duration::from_nanos(500_000), &kind);
        assert_eq!(core.next_event_time(), Some(500_000));
        assert_eq!(core.pending_event_count(), 2);
    }

    #[test]
    fn service_gated_by_downcount_and_pause() {
        let core = single_core();
        core.reset_ticks();
        assert!(!core.service());

        core.add_ticks(10_000);
        core.pause(true);
        assert!(!core.service());

        core.pause(false);
        assert!(core.service());
        assert_eq!(core.downcount(), 10_000);
    }

    #[test]
    fn reinitialize_clears_queue_and_counters() {
        let mut core = single_core();
        let kind = create_event("k", |_, _| None);
        core.add_ticks(123);
        core.schedule_event(Duration::from_millis(1), &kind);
        core.initialize(|| {}).unwrap();
        assert_eq!(core.cpu_ticks(), 0);
        assert!(!core.has_pending_events());
    }

    #[test]
    fn extreme_due_times_saturate_lateness() {
        let core = single_core();
        let seen = Arc::new(AtomicI64::new(0));
        let kind = {
            let seen = Arc::clone(&seen);
            create_event("ancient", move |_, lateness| {
                seen.store(lateness, Ordering::Relaxed);
                None
            })
        };

        core.schedule_event_at(i64::MIN, &kind);
        core.add_ticks(1_020);
        assert_eq!(core.advance(), None);
        assert_eq!(seen.load(Ordering::Relaxed), i64::MAX);
    }

    #[test]
    fn set_multicore_switches_time_domain_immediately() {
        let clock = Arc::new(clock::ManualClock::new());
        clock.set_ns(7_000);
        let mut core = CoreTiming::with_clock(clock.clone(), TimingConfig::default());
        core.initialize(|| {}).unwrap();
        core.add_ticks(1_020);
        assert_eq!(core.global_time_ns(), 1_000);

        core.set_multicore(true);
        assert_eq!(core.global_time_ns(), 7_000);
        assert!(!core.has_thread.load(Ordering::Acquire));
    }
}
