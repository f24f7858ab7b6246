//! Cooperative cancellation shared between the caller and one worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Flag {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<Flag>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.cancelled.store(true, Ordering::SeqCst);
        let _guard = self.flag.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.flag.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.cancelled.load(Ordering::Relaxed)
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `false` if the sleep was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.flag.lock.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if self.flag.cancelled.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            guard = match self.flag.wake.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}
