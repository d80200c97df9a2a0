#![allow(dead_code)]

use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use emutime_core::clock::ns_to_cpu_tick;
use emutime_core::{CoreTiming, EventType, TimingConfig, create_event};

static LOGGER: OnceCell<()> = OnceCell::new();

pub fn init_logger() {
    LOGGER.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub const MS: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    pub name: &'static str,
    pub due: i64,
    pub lateness: i64,
}

/// Shared log of every callback invocation, in delivery order.
#[derive(Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<Firing>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An event kind that records its firings and never asks to reschedule.
    pub fn event(&self, name: &'static str) -> Arc<EventType> {
        self.event_with(name, |_, _| None)
    }

    pub fn event_with<F>(&self, name: &'static str, f: F) -> Arc<EventType>
    where
        F: Fn(i64, i64) -> Option<Duration> + Send + Sync + 'static,
    {
        let log = Arc::clone(&self.log);
        create_event(name, move |due, lateness| {
            log.lock().unwrap().push(Firing {
                name,
                due,
                lateness,
            });
            f(due, lateness)
        })
    }

    pub fn firings(&self) -> Vec<Firing> {
        self.log.lock().unwrap().clone()
    }

    pub fn dues(&self) -> Vec<(&'static str, i64)> {
        self.firings().iter().map(|f| (f.name, f.due)).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.firings().iter().filter(|f| f.name == name).count()
    }
}

pub fn single_core() -> CoreTiming {
    single_core_with(TimingConfig::default())
}

pub fn single_core_with(config: TimingConfig) -> CoreTiming {
    init_logger();
    let mut core = CoreTiming::with_config(config);
    core.initialize(|| {}).unwrap();
    core
}

/// Execute CPU ticks until virtual time reaches `ns`, without dispatching.
pub fn tick_to(core: &CoreTiming, ns: i64) {
    let target = ns_to_cpu_tick(ns as u64);
    core.add_ticks(target.saturating_sub(core.cpu_ticks()));
}

/// Move virtual time to `ns` and run one dispatch pass.
pub fn run_to(core: &CoreTiming, ns: i64) -> Option<i64> {
    tick_to(core, ns);
    core.advance()
}
