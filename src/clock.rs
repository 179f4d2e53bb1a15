//! Injected time source so TTL and history logic is testable without sleeps.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Time source seam. Production code uses [`SystemClock`]; tests advance a
/// [`ManualClock`] to exercise TTL expiry deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and local tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut g = self.now.lock().expect("manual clock mutex poisoned");
        *g += delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut g = self.now.lock().expect("manual clock mutex poisoned");
        *g = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("manual clock mutex poisoned")
    }
}
