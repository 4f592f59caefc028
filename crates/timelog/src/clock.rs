//! Wall-clock source used to stamp records appended without an explicit time.

use std::sync::RwLock;
use std::time::{Duration, SystemTime};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;
}

/// Clock backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<SystemTime>,
}

impl MockClock {
    /// Creates a clock frozen at `time`.
    pub fn with_time(time: SystemTime) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }

    /// Sets the clock to `time`.
    pub fn set_time(&self, time: SystemTime) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = time;
    }
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}
