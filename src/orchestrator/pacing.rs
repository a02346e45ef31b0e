//! Daytime pacing and the interruptible wait used for it.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// How long to wait after a cycle before starting the next one.
///
/// Only stable daytime cycles are paced; nighttime and unstable cycles run
/// back to back. Returns `None` when no pacing applies, otherwise the
/// configured delay minus the time the cycle already took, floored at zero.
pub fn pacing_delay(night: bool, stable: bool, daytime_delay: Duration, elapsed: Duration) -> Option<Duration> {
    if night || !stable {
        return None;
    }
    Some(daytime_delay.saturating_sub(elapsed))
}

/// Cancellation token shared between the capture loop and the signal handler.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown and wakes any waiter.
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().unwrap_or_else(|e| e.into_inner());
        *triggered = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Waits up to `timeout`. Returns true if shutdown was requested before
    /// or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut triggered = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            triggered = match cvar.wait_timeout(triggered, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *triggered
    }
}
