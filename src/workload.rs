use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel as cb;
use emutime_core::{CoreTiming, EventType, UnscheduleMode, create_event};
use log::{debug, info, trace};

use crate::config::{ProbeConfig, SchedulingModel};
use crate::error::ProbeError;
use crate::report::{Firing, Report};

/// Three representative hardware timers on one scheduler: a display refresh,
/// an audio buffer drain and a one-shot watchdog that silences audio.
pub struct Workload {
    config: ProbeConfig,
    core: CoreTiming,
    vblank: Arc<EventType>,
    audio: Arc<EventType>,
    timeout: Arc<EventType>,
    firings: cb::Receiver<Firing>,
}

fn recording_event<F>(name: &'static str, tx: cb::Sender<Firing>, then: F) -> Arc<EventType>
where
    F: Fn() + Send + Sync + 'static,
{
    create_event(name, move |due, lateness| {
        trace!("{name} due={due} lateness={lateness}");
        let _ = tx.send(Firing {
            name,
            due,
            lateness,
        });
        then();
        None
    })
}

impl Workload {
    pub fn new(config: ProbeConfig) -> Self {
        let core = CoreTiming::with_config(config.timing_config());
        let (tx, rx) = cb::unbounded();

        let vblank = recording_event("vblank", tx.clone(), || {});
        let audio = recording_event("audio", tx.clone(), || {});
        let timeout = {
            let timing = core.handle();
            let audio = Arc::downgrade(&audio);
            recording_event("timeout", tx, move || {
                if let Some(audio) = audio.upgrade() {
                    timing.unschedule_event(&audio, UnscheduleMode::Wait);
                    debug!("timeout stopped audio");
                }
            })
        };

        Self {
            config,
            core,
            vblank,
            audio,
            timeout,
            firings: rx,
        }
    }

    pub fn run(mut self) -> Result<Report, ProbeError> {
        self.core.initialize(|| debug!("probe attached to dispatch thread"))?;
        self.schedule();

        let elapsed_ns = match self.config.model {
            SchedulingModel::SingleCore => self.run_single_core(),
            SchedulingModel::Multicore => self.run_multicore(),
        };
        self.core.reset();

        let firings: Vec<Firing> = self.firings.try_iter().collect();
        info!(
            "run finished with {} firings, {} events still queued",
            firings.len(),
            self.core.pending_event_count()
        );
        Ok(Report::new(self.config.model, elapsed_ns, firings))
    }

    // One base time for all timers: a tie between the timeout and an audio
    // instance then goes to scheduling order in both models.
    fn schedule(&self) {
        let now = self.core.global_time_ns();
        let at = |d: Duration| {
            now.saturating_add(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        };

        let vblank = self.config.vblank_period();
        let audio = self.config.audio_period();
        self.core.schedule_looping_event_at(at(vblank), vblank, &self.vblank);
        self.core.schedule_looping_event_at(at(audio), audio, &self.audio);
        self.core.schedule_event_at(at(self.config.timeout()), &self.timeout);
    }

    /// Execute batches of CPU ticks, handing control to the scheduler
    /// whenever the slice runs out.
    fn run_single_core(&self) -> i64 {
        let core = &self.core;
        core.reset_ticks();
        while core.cpu_ticks() < self.config.cycles {
            if core.has_pending_events() {
                core.add_ticks(self.config.batch_ticks.max(1));
            } else {
                core.idle();
            }
            core.service();
        }
        core.global_time_ns()
    }

    fn run_multicore(&self) -> i64 {
        thread::sleep(Duration::from_millis(self.config.duration_ms));
        self.core.sync_pause(true);
        self.core.global_time_ns()
    }
}
