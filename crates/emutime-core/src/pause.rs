use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use log::debug;

use crate::signal::lock;

/// Run state of the dispatch engine.
///
/// The controller moves between `Running` and `PauseRequested`/`Paused`; only
/// the dispatch thread performs `PauseRequested -> Paused`. Without a
/// dispatch thread a pause request lands directly in `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Running,
    PauseRequested,
    Paused,
}

#[derive(Debug, Default)]
pub(crate) struct PauseControl {
    state: Mutex<RunState>,
    changed: Condvar,
}

impl PauseControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    /// Controller side. Returns the new state.
    pub fn request(&self, paused: bool, has_thread: bool) -> RunState {
        let mut state = lock(&self.state);
        let next = match (paused, *state) {
            (false, _) => RunState::Running,
            (true, RunState::Paused) => RunState::Paused,
            (true, _) if has_thread => RunState::PauseRequested,
            (true, _) => RunState::Paused,
        };
        if next != *state {
            debug!("run state {:?} -> {:?}", *state, next);
            *state = next;
        }
        self.changed.notify_all();
        next
    }

    /// Dispatch thread side: acknowledge a pending pause request and block
    /// until resumed or shut down.
    pub fn park(&self, shutting_down: &AtomicBool) {
        let mut state = lock(&self.state);
        if *state == RunState::PauseRequested {
            debug!("run state PauseRequested -> Paused");
            *state = RunState::Paused;
            self.changed.notify_all();
        }
        let _state = self
            .changed
            .wait_while(state, |s| {
                *s != RunState::Running && !shutting_down.load(Ordering::Acquire)
            })
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the engine has settled into (or out of) `Paused`.
    pub fn wait_settled(&self, paused: bool, shutting_down: &AtomicBool) {
        let state = lock(&self.state);
        let _state = self
            .changed
            .wait_while(state, |s| {
                (*s == RunState::Paused) != paused && !shutting_down.load(Ordering::Acquire)
            })
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Wake every waiter so it can observe a changed shutdown flag.
    pub fn wake_all(&self) {
        let _state = lock(&self.state);
        self.changed.notify_all();
    }

    pub fn reset(&self) {
        *lock(&self.state) = RunState::Running;
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pause_without_thread_is_immediate() {
        let pause = PauseControl::new();
        assert_eq!(pause.request(true, false), RunState::Paused);
        assert_eq!(pause.request(false, false), RunState::Running);
    }

    #[test]
    fn pause_with_thread_waits_for_acknowledgement() {
        let pause = Arc::new(PauseControl::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        assert_eq!(pause.request(true, true), RunState::PauseRequested);

        let dispatcher = {
            let pause = Arc::clone(&pause);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || pause.park(&shutdown))
        };

        pause.wait_settled(true, &shutdown);
        assert_eq!(pause.state(), RunState::Paused);

        pause.request(false, true);
        dispatcher.join().unwrap();
        assert_eq!(pause.state(), RunState::Running);
    }

    #[test]
    fn repeated_pause_stays_paused() {
        let pause = PauseControl::new();
        pause.request(true, false);
        assert_eq!(pause.request(true, true), RunState::Paused);
    }

    #[test]
    fn shutdown_releases_parked_thread() {
        let pause = Arc::new(PauseControl::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        pause.request(true, true);

        let dispatcher = {
            let pause = Arc::clone(&pause);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || pause.park(&shutdown))
        };
        thread::sleep(Duration::from_millis(5));

        shutdown.store(true, Ordering::Release);
        pause.wake_all();
        dispatcher.join().unwrap();
    }
}
