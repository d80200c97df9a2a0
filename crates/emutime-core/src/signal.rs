use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::warn;

/// Lock `mutex`, recovering the guard if a panicking callback poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("recovering poisoned scheduler lock");
        poisoned.into_inner()
    })
}

/// Auto-reset binary signal.
///
/// `set` latches until exactly one waiter consumes it, so a set that races
/// ahead of the wait is never lost.
#[derive(Debug, Default)]
pub struct Signal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut flag = lock(&self.flag);
        *flag = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *lock(&self.flag) = false;
    }

    pub fn is_set(&self) -> bool {
        *lock(&self.flag)
    }

    /// Block until set, then clear.
    pub fn wait(&self) {
        let flag = lock(&self.flag);
        let mut flag = self
            .cond
            .wait_while(flag, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        *flag = false;
    }

    /// Block until set or `timeout` elapses. Returns whether the signal was
    /// consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let flag = lock(&self.flag);
        let (mut flag, _) = self
            .cond
            .wait_timeout_while(flag, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *flag, false)
    }
}
