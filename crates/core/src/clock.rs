// SPDX-License-Identifier: MIT

//! Clock abstraction for testable time handling.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;

    fn epoch_s(&self) -> u64 {
        self.epoch_ms() / 1000
    }

    /// Local wall-clock time as (hour, minute, second), used by the
    /// dequeue time window.
    fn local_hms(&self) -> (u32, u32, u32);
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn local_hms(&self) -> (u32, u32, u32) {
        use chrono::Timelike;
        let now = chrono::Local::now();
        (now.hour(), now.minute(), now.second())
    }
}

/// Fake clock for testing with controllable time.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeInner>>,
}

struct FakeInner {
    current: Instant,
    epoch_ms: u64,
    hms: (u32, u32, u32),
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeInner {
                current: Instant::now(),
                epoch_ms: 1_000_000_000,
                hms: (12, 0, 0),
            })),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.current += duration;
        inner.epoch_ms += duration.as_millis() as u64;
    }

    /// Set the epoch milliseconds value.
    pub fn set_epoch_ms(&self, ms: u64) {
        self.inner.lock().epoch_ms = ms;
    }

    /// Set the local wall-clock reading.
    pub fn set_hms(&self, hour: u32, minute: u32, second: u32) {
        self.inner.lock().hms = (hour, minute, second);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.inner.lock().current
    }

    fn epoch_ms(&self) -> u64 {
        self.inner.lock().epoch_ms
    }

    fn local_hms(&self) -> (u32, u32, u32) {
        self.inner.lock().hms
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
